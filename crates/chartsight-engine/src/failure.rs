use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Classified reason an analysis call did not produce narrative text.
///
/// Every kind is terminal for the current call. Only `SchemaRejected` is ever
/// retried, and only once, by [`crate::pipeline::AnalysisPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    /// Upload missing, of an unsupported type, or not decodable.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    /// Credential missing/invalid or model unavailable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The model service did not accept the request shape.
    #[error("request shape rejected: {0}")]
    SchemaRejected(String),
    /// Network, quota, or server-side failure.
    #[error("transient error: {0}")]
    Transient(String),
    /// Call succeeded but carried no usable text.
    #[error("empty response: {0}")]
    EmptyResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidImage,
    ConfigurationError,
    SchemaRejected,
    TransientError,
    EmptyResponse,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidImage => "invalid_image",
            FailureKind::ConfigurationError => "configuration_error",
            FailureKind::SchemaRejected => "schema_rejected",
            FailureKind::TransientError => "transient_error",
            FailureKind::EmptyResponse => "empty_response",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnalysisFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisFailure::InvalidImage(_) => FailureKind::InvalidImage,
            AnalysisFailure::Configuration(_) => FailureKind::ConfigurationError,
            AnalysisFailure::SchemaRejected(_) => FailureKind::SchemaRejected,
            AnalysisFailure::Transient(_) => FailureKind::TransientError,
            AnalysisFailure::EmptyResponse(_) => FailureKind::EmptyResponse,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            AnalysisFailure::InvalidImage(detail)
            | AnalysisFailure::Configuration(detail)
            | AnalysisFailure::SchemaRejected(detail)
            | AnalysisFailure::Transient(detail)
            | AnalysisFailure::EmptyResponse(detail) => detail,
        }
    }

    pub fn is_schema_rejection(&self) -> bool {
        matches!(self, AnalysisFailure::SchemaRejected(_))
    }
}
