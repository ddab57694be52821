use indexmap::IndexMap;

pub const VISION_CAPABILITY: &str = "vision";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
    /// Whether the model accepts an out-of-band `systemInstruction` field.
    pub supports_system_instruction: bool,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      capabilities: &[&str],
                      context_window: Option<u64>,
                      supports_system_instruction: bool| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: "gemini".to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
                supports_system_instruction,
            },
        );
    };

    insert(
        "gemini-2.5-flash-preview-09-2025",
        &["text", "vision"],
        Some(1_048_576),
        true,
    );
    insert("gemini-2.5-flash", &["text", "vision"], Some(1_048_576), true);
    insert("gemini-2.5-pro", &["text", "vision"], Some(1_048_576), true);
    insert("gemini-2.0-flash", &["text", "vision"], Some(1_048_576), true);
    insert("gemma-3-27b-it", &["text", "vision"], Some(131_072), false);
    insert("gemini-2.5-flash-image", &["image"], None, true);

    map
}
