use std::env;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::compat::CompatibilityMode;
use crate::failure::AnalysisFailure;
use crate::prompt::{AnalysisRequest, ComposedPrompt};
use crate::truncate_text;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
const API_KEY_HEADER: &str = "x-goog-api-key";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MAX_DETAIL_CHARS: usize = 512;

/// Lower-cased fragments of a 400 `INVALID_ARGUMENT` message that mean the request
/// shape, not its content, was refused.
const SHAPE_REJECTION_MARKERS: [&str; 6] = [
    "unknown name",
    "invalid json payload",
    "cannot find field",
    "systeminstruction",
    "system_instruction",
    "developer instruction is not enabled",
];

/// Seam between the pipeline and a hosted multimodal model.
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    fn send(
        &self,
        request: &AnalysisRequest,
        mode: CompatibilityMode,
    ) -> Result<String, AnalysisFailure>;

    // Never includes image bytes.
    fn describe_request(
        &self,
        _request: &AnalysisRequest,
        _mode: CompatibilityMode,
    ) -> Map<String, Value> {
        Map::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub request_timeout_s: f64,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            api_base: DEFAULT_API_BASE.to_string(),
            model: model.into(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        Self::from_lookup(model, non_empty_env)
    }

    pub fn from_lookup(
        model: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(
            lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            model,
        );
        if let Some(base) = lookup("GEMINI_API_BASE")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
        {
            config.api_base = base;
        }
        config.request_timeout_s = lookup("GEMINI_REQUEST_TIMEOUT")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
            .clamp(15.0, 300.0);
        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().trim_end_matches('/').to_string();
        self
    }
}

pub struct GeminiProvider {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn with_http_client(config: GeminiConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }
}

impl AnalysisProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn send(
        &self,
        request: &AnalysisRequest,
        mode: CompatibilityMode,
    ) -> Result<String, AnalysisFailure> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(AnalysisFailure::Configuration(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let endpoint = self.endpoint();
        let payload = build_payload(request, mode);

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .timeout(Duration::from_secs_f64(self.config.request_timeout_s))
            .json(&payload)
            .send()
            .map_err(|err| classify_transport_error(err, &endpoint))?;

        let status = response.status();
        let body = response.text().map_err(|err| {
            AnalysisFailure::Transient(format!(
                "Gemini response body read failed: {}",
                err.without_url()
            ))
        })?;
        if !status.is_success() {
            return Err(classify_http_failure(status.as_u16(), &body));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            AnalysisFailure::Transient(format!("Gemini returned invalid JSON payload: {err}"))
        })?;
        extract_text(&parsed)
    }

    fn describe_request(
        &self,
        request: &AnalysisRequest,
        mode: CompatibilityMode,
    ) -> Map<String, Value> {
        let mut summary = summarize_payload(&build_payload(request, mode));
        summary.insert("endpoint".to_string(), Value::String(self.endpoint()));
        summary
    }
}

pub fn build_payload(request: &AnalysisRequest, mode: CompatibilityMode) -> Value {
    let image = request.image();
    let image_part = json!({
        "inlineData": {
            "mimeType": image.mime_type(),
            "data": image.to_base64(),
        }
    });

    match request.prompt(mode) {
        ComposedPrompt::Split {
            system_text,
            user_text,
        } => json!({
            "systemInstruction": {
                "parts": [{ "text": system_text }],
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": user_text }, image_part],
            }],
        }),
        ComposedPrompt::Merged { merged_text } => json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": merged_text }, image_part],
            }],
        }),
    }
}

pub fn extract_text(response_payload: &Value) -> Result<String, AnalysisFailure> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let Some(candidate) = candidates.first() else {
        let reason = response_payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str);
        return Err(AnalysisFailure::EmptyResponse(match reason {
            Some(reason) => format!("prompt blocked by model ({reason})"),
            None => "model returned no candidates".to_string(),
        }));
    };

    let text = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(AnalysisFailure::EmptyResponse(format!(
            "model returned no text (finishReason: {finish_reason})"
        )));
    }
    Ok(text)
}

/// Maps a non-2xx response onto the failure taxonomy.
pub fn classify_http_failure(code: u16, body: &str) -> AnalysisFailure {
    let envelope = serde_json::from_str::<Value>(body).ok();
    let error = envelope.as_ref().and_then(|value| value.get("error"));
    let status = error
        .and_then(|value| value.get("status"))
        .and_then(Value::as_str);
    let message = error
        .and_then(|value| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());
    let reasons = error
        .and_then(|value| value.get("details"))
        .and_then(Value::as_array)
        .map(|details| {
            details
                .iter()
                .filter_map(|detail| detail.get("reason").and_then(Value::as_str))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let detail = match status {
        Some(status) => format!("Gemini request failed ({code} {status}): {message}"),
        None => format!("Gemini request failed ({code}): {message}"),
    };
    let detail = truncate_text(&detail, MAX_DETAIL_CHARS);
    let lowered = message.to_ascii_lowercase();

    match code {
        400 if matches!(status, None | Some("INVALID_ARGUMENT"))
            && SHAPE_REJECTION_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker)) =>
        {
            AnalysisFailure::SchemaRejected(detail)
        }
        400 if reasons.contains(&"API_KEY_INVALID") || lowered.contains("api key not valid") => {
            AnalysisFailure::Configuration(detail)
        }
        400 if lowered.contains("unable to process input image") => {
            AnalysisFailure::InvalidImage(detail)
        }
        _ if matches!(status, Some("FAILED_PRECONDITION" | "PERMISSION_DENIED")) => {
            AnalysisFailure::Configuration(detail)
        }
        401 | 403 | 404 => AnalysisFailure::Configuration(detail),
        _ => AnalysisFailure::Transient(detail),
    }
}

fn classify_transport_error(err: reqwest::Error, endpoint: &str) -> AnalysisFailure {
    let is_builder = err.is_builder();
    let err = err.without_url();
    if is_builder {
        return AnalysisFailure::Configuration(format!(
            "Gemini request could not be built for {endpoint}: {err}"
        ));
    }
    AnalysisFailure::Transient(format!("Gemini request failed ({endpoint}): {err}"))
}

/// Reduces a payload to something safe to log: text is clipped, image data is
/// replaced by its length.
pub fn summarize_payload(payload: &Value) -> Map<String, Value> {
    let mut summary = Map::new();
    if let Some(system_text) = payload
        .pointer("/systemInstruction/parts/0/text")
        .and_then(Value::as_str)
    {
        summary.insert(
            "systemInstruction".to_string(),
            json!({ "textLen": system_text.chars().count() }),
        );
    }
    if let Some(contents) = payload.get("contents").and_then(Value::as_array) {
        let summarized = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(Value::as_array)
                    .map(|parts| parts.iter().map(summarize_part).collect::<Vec<_>>())
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect::<Vec<_>>();
        summary.insert("contents".to_string(), Value::Array(summarized));
    }
    summary
}

fn summarize_part(part: &Value) -> Value {
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        return json!({ "text": truncate_text(text, 200) });
    }
    if let Some(inline) = part.get("inlineData") {
        let mime_type = inline
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let data_len = inline
            .get("data")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or(0);
        return json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } });
    }
    json!({ "unknownPart": true })
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
