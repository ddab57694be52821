use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Default,
    Registered,
    /// Not in the registry; the name is forwarded to the service as given.
    PassThrough,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub source: SelectionSource,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let Some(requested) = requested
            .map(|value| value.trim().trim_start_matches("models/"))
            .filter(|value| !value.is_empty())
        else {
            return Ok(ModelSelection {
                model: self.default_for(capability)?,
                requested: None,
                source: SelectionSource::Default,
                fallback_reason: None,
            });
        };

        match self.registry.get(requested) {
            Some(model) if model.supports(capability) => Ok(ModelSelection {
                model: model.clone(),
                requested: Some(requested.to_string()),
                source: SelectionSource::Registered,
                fallback_reason: None,
            }),
            Some(_) => Ok(ModelSelection {
                model: self.default_for(capability)?,
                requested: Some(requested.to_string()),
                source: SelectionSource::Fallback,
                fallback_reason: Some(format!(
                    "Requested model '{requested}' unavailable for capability '{capability}'."
                )),
            }),
            None => Ok(ModelSelection {
                model: pass_through(requested, capability),
                requested: Some(requested.to_string()),
                source: SelectionSource::PassThrough,
                fallback_reason: None,
            }),
        }
    }

    fn default_for(&self, capability: &str) -> Result<ModelSpec, String> {
        self.registry
            .by_capability(capability)
            .into_iter()
            .next()
            .ok_or_else(|| format!("No models available for capability '{capability}'."))
    }
}

// Gemma revisions reject `systemInstruction`; anything else starts on the split shape
// and relies on the runtime downgrade.
fn pass_through(name: &str, capability: &str) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        provider: "gemini".to_string(),
        capabilities: vec![capability.to_string()],
        context_window: None,
        supports_system_instruction: !name.to_ascii_lowercase().starts_with("gemma"),
    }
}
