//! Chart screenshot analysis pipeline.
//!
//! An upload is validated by [`image_encoder`], shaped into a request by [`prompt`]
//! under the current [`compat::CompatibilityMode`], and sent through an
//! [`gemini::AnalysisProvider`]. [`pipeline::AnalysisPipeline`] ties these together and
//! owns the one-shot downgrade from split instructions to a merged prompt.

pub mod compat;
pub mod failure;
pub mod gemini;
pub mod image_encoder;
pub mod pipeline;
pub mod prompt;

use serde_json::{Map, Value};

pub use compat::{CompatibilityMode, CompatibilityState};
pub use failure::{AnalysisFailure, FailureKind};
pub use gemini::{AnalysisProvider, GeminiConfig, GeminiProvider};
pub use image_encoder::{encode_upload, mime_for_path, UploadedImage, SUPPORTED_MIME_TYPES};
pub use pipeline::{AnalysisPipeline, AnalysisReport, AnalysisResult, RESULT_DISCLAIMER};
pub use prompt::{compose, AnalysisRequest, ComposedPrompt};

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
