use std::path::PathBuf;
use std::sync::Arc;

use chartsight_contracts::events::EventWriter;
use chartsight_contracts::runs::receipts::{
    build_receipt, write_receipt, AnalysisReceipt, ImageDigest, ReceiptOutcome,
};
use chartsight_contracts::timeframe::Timeframe;
use serde_json::{json, Map, Value};

use crate::compat::{CompatibilityMode, CompatibilityState};
use crate::failure::AnalysisFailure;
use crate::gemini::AnalysisProvider;
use crate::image_encoder::encode_upload;
use crate::map_object;
use crate::prompt::AnalysisRequest;

/// Shown after every successful analysis.
pub const RESULT_DISCLAIMER: &str = "\
**Important warning:** Price targets or specific moves predicted by the AI are based only on \
visual analysis of a static image and are highly speculative. Do NOT use this as the basis for \
your trading decisions. The AI has NO access to real-time price data or current market information.

*This is an AI analysis and not financial advice. Always do your own research (DYOR).*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub text: String,
    pub model: String,
    pub timeframe: Timeframe,
    pub mode: CompatibilityMode,
    pub attempts: u32,
}

impl AnalysisReport {
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.text, RESULT_DISCLAIMER)
    }
}

pub type AnalysisResult = Result<AnalysisReport, AnalysisFailure>;

struct Attempted {
    result: AnalysisResult,
    mode: CompatibilityMode,
    attempts: u32,
}

/// Upload validation, request shaping, and the one-shot compatibility retry.
pub struct AnalysisPipeline {
    provider: Box<dyn AnalysisProvider>,
    compatibility: Arc<CompatibilityState>,
    events: Option<EventWriter>,
    receipt_path: Option<PathBuf>,
    known_incompatible: bool,
}

impl AnalysisPipeline {
    /// Uses the process-wide compatibility state.
    pub fn new<P: AnalysisProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Box::new(provider),
            compatibility: CompatibilityState::process(),
            events: None,
            receipt_path: None,
            known_incompatible: false,
        }
    }

    pub fn with_compatibility(mut self, compatibility: Arc<CompatibilityState>) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_receipt(mut self, path: impl Into<PathBuf>) -> Self {
        self.receipt_path = Some(path.into());
        self
    }

    /// Marks the model as refusing system instructions, so the first call already
    /// goes out merged. The downgrade still happens through the shared state.
    pub fn with_known_incompatible(mut self, known_incompatible: bool) -> Self {
        self.known_incompatible = known_incompatible;
        self
    }

    pub fn compatibility_mode(&self) -> CompatibilityMode {
        self.compatibility.current()
    }

    pub fn run_analysis(
        &self,
        uploaded_bytes: Vec<u8>,
        declared_mime_type: &str,
        timeframe_label: &str,
    ) -> AnalysisResult {
        let timeframe = Timeframe::parse_lenient(timeframe_label);
        self.emit(
            "analysis_started",
            json!({
                "timeframe": timeframe.code(),
                "provider": self.provider.name(),
                "model": self.provider.model(),
                "declared_mime_type": declared_mime_type,
                "byte_len": uploaded_bytes.len(),
            }),
        );

        let image = match encode_upload(uploaded_bytes, declared_mime_type) {
            Ok(image) => image,
            Err(failure) => {
                let attempted = Attempted {
                    result: Err(failure),
                    mode: self.compatibility.current(),
                    attempts: 0,
                };
                return self.finish(timeframe, None, Map::new(), attempted);
            }
        };

        let digest = image.digest();
        self.emit(
            "image_validated",
            json!({
                "mime_type": image.mime_type(),
                "detected_mime_type": image.detected_mime_type(),
                "byte_len": digest.byte_len,
                "width": digest.width,
                "height": digest.height,
                "sha256": digest.sha256,
            }),
        );

        let request = AnalysisRequest::new(image, timeframe);
        let attempted = self.invoke(&request);
        let provider_request = if self.receipt_path.is_some() {
            self.provider.describe_request(&request, attempted.mode)
        } else {
            Map::new()
        };
        self.finish(timeframe, Some(digest), provider_request, attempted)
    }

    fn invoke(&self, request: &AnalysisRequest) -> Attempted {
        if self.known_incompatible
            && self.compatibility.current() == CompatibilityMode::SplitInstruction
        {
            let transitioned = self.compatibility.downgrade();
            self.emit(
                "compatibility_downgraded",
                json!({
                    "from": CompatibilityMode::SplitInstruction.as_str(),
                    "to": CompatibilityMode::MergedPrompt.as_str(),
                    "transitioned": transitioned,
                    "detail": "model does not accept system instructions",
                }),
            );
        }
        let mode = self.compatibility.current();
        match self.attempt(request, mode, 1) {
            Err(failure)
                if failure.is_schema_rejection() && mode == CompatibilityMode::SplitInstruction =>
            {
                let transitioned = self.compatibility.downgrade();
                self.emit(
                    "compatibility_downgraded",
                    json!({
                        "from": CompatibilityMode::SplitInstruction.as_str(),
                        "to": CompatibilityMode::MergedPrompt.as_str(),
                        "transitioned": transitioned,
                        "detail": failure.detail(),
                    }),
                );
                Attempted {
                    result: self.attempt(request, CompatibilityMode::MergedPrompt, 2),
                    mode: CompatibilityMode::MergedPrompt,
                    attempts: 2,
                }
            }
            result => Attempted {
                result,
                mode,
                attempts: 1,
            },
        }
    }

    fn attempt(
        &self,
        request: &AnalysisRequest,
        mode: CompatibilityMode,
        attempt: u32,
    ) -> AnalysisResult {
        self.emit(
            "analysis_attempt",
            json!({
                "attempt": attempt,
                "mode": mode.as_str(),
            }),
        );
        let text = self.provider.send(request, mode)?;
        Ok(AnalysisReport {
            text,
            model: self.provider.model().to_string(),
            timeframe: request.timeframe(),
            mode,
            attempts: attempt,
        })
    }

    fn finish(
        &self,
        timeframe: Timeframe,
        image: Option<ImageDigest>,
        provider_request: Map<String, Value>,
        attempted: Attempted,
    ) -> AnalysisResult {
        let outcome = match &attempted.result {
            Ok(report) => {
                self.emit(
                    "analysis_completed",
                    json!({
                        "mode": report.mode.as_str(),
                        "attempts": report.attempts,
                        "response_chars": report.text.chars().count(),
                    }),
                );
                ReceiptOutcome::Ok {
                    response_chars: report.text.chars().count() as u64,
                }
            }
            Err(failure) => {
                self.emit(
                    "analysis_failed",
                    json!({
                        "kind": failure.kind().as_str(),
                        "detail": failure.detail(),
                        "mode": attempted.mode.as_str(),
                        "attempts": attempted.attempts,
                    }),
                );
                ReceiptOutcome::Failed {
                    kind: failure.kind().as_str().to_string(),
                    detail: failure.detail().to_string(),
                }
            }
        };

        if let Some(path) = self.receipt_path.as_ref() {
            let receipt = AnalysisReceipt {
                timeframe,
                model: self.provider.model().to_string(),
                compatibility_mode: attempted.mode.as_str().to_string(),
                attempts: attempted.attempts,
                image,
                provider_request,
                outcome,
            };
            if let Err(err) = write_receipt(path, &build_receipt(&receipt)) {
                self.emit(
                    "receipt_write_failed",
                    json!({
                        "path": path.to_string_lossy(),
                        "error": format!("{err:#}"),
                    }),
                );
            }
        }

        attempted.result
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.events.as_ref() {
            // The event log is best-effort; it never changes an analysis outcome.
            let _ = events.emit(event_type, map_object(payload));
        }
    }
}
