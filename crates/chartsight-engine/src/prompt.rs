use chartsight_contracts::timeframe::Timeframe;

use crate::compat::CompatibilityMode;
use crate::image_encoder::UploadedImage;

/// Analyst persona sent with every request. Never varies per call.
pub const INSTRUCTION_TEMPLATE: &str = "\
You are an expert AI technical analyst for trading charts.
Your main task is to analyze the provided trading chart screenshot and proactively identify indicator patterns in order to predict bullish or bearish signals.
The user will provide a timeframe context (for example '1 Minute', '1 Hour', '1 Day'). Use this timeframe to refine your analysis. Short timeframes (scalping) carry different implications than daily timeframes (swing).

Focus on:
1.  **Indicator Analysis:** Look for signals in RSI (overbought, oversold, divergence), MACD (crossover, divergence), Moving Averages (golden cross, death cross), Bollinger Bands (squeeze, breakout).
2.  **Candlestick Pattern Analysis:** Identify reversal or continuation patterns (doji, hammer, engulfing).
3.  **Chart Pattern Analysis:** Look for larger patterns (double top/bottom, head and shoulders, triangles, wedges).
4.  **Volume:** Analyze volume to confirm the strength of the signal.

**IMPORTANT:** If there is a clear chart pattern or visible support/resistance level, try to identify potential price targets or key levels in your analysis. However, **STATE CLEARLY THAT THIS IS HIGHLY SPECULATIVE AND BASED ONLY ON THE VISUAL, NOT ON REAL-TIME DATA.** You have no access to live prices or market fundamentals.

After analyzing all of this, give a predictive conclusion: **BULLISH**, **BEARISH**, or **NEUTRAL/SIDEWAYS**.
Explain your reasoning briefly and clearly based on what you see in the image.

Always end with a warning that this is not financial advice (DYOR).
Answer in English.
";

/// Marks, inside a merged prompt, where the inline image belongs.
pub const IMAGE_ATTACHED_MARKER: &str = "[Chart image attached]";

pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

pub fn task_directive(timeframe: Timeframe) -> String {
    format!(
        "Perform a predictive (bullish/bearish) analysis of this chart image. The timeframe context is: {}.",
        timeframe.label()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposedPrompt {
    Split {
        system_text: String,
        user_text: String,
    },
    Merged {
        merged_text: String,
    },
}

impl ComposedPrompt {
    pub fn user_turn_text(&self) -> &str {
        match self {
            ComposedPrompt::Split { user_text, .. } => user_text,
            ComposedPrompt::Merged { merged_text } => merged_text,
        }
    }

    pub fn system_text(&self) -> Option<&str> {
        match self {
            ComposedPrompt::Split { system_text, .. } => Some(system_text),
            ComposedPrompt::Merged { .. } => None,
        }
    }
}

pub fn compose(mode: CompatibilityMode, timeframe: Timeframe) -> ComposedPrompt {
    let directive = task_directive(timeframe);
    match mode {
        CompatibilityMode::SplitInstruction => ComposedPrompt::Split {
            system_text: INSTRUCTION_TEMPLATE.to_string(),
            user_text: directive,
        },
        CompatibilityMode::MergedPrompt => ComposedPrompt::Merged {
            merged_text: format!(
                "{INSTRUCTION_TEMPLATE}{PROMPT_SEPARATOR}{IMAGE_ATTACHED_MARKER}\n\n{directive}"
            ),
        },
    }
}

/// One analysis call's inputs. Built fresh per call and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    image: UploadedImage,
    timeframe: Timeframe,
}

impl AnalysisRequest {
    pub fn new(image: UploadedImage, timeframe: Timeframe) -> Self {
        Self { image, timeframe }
    }

    pub fn image(&self) -> &UploadedImage {
        &self.image
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn prompt(&self, mode: CompatibilityMode) -> ComposedPrompt {
        compose(mode, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use chartsight_contracts::timeframe::Timeframe;

    use super::{
        compose, task_directive, ComposedPrompt, IMAGE_ATTACHED_MARKER, INSTRUCTION_TEMPLATE,
        PROMPT_SEPARATOR,
    };
    use crate::compat::CompatibilityMode;

    #[test]
    fn split_mode_keeps_template_as_system_text_for_every_timeframe() {
        for timeframe in Timeframe::ALL {
            let ComposedPrompt::Split {
                system_text,
                user_text,
            } = compose(CompatibilityMode::SplitInstruction, timeframe)
            else {
                panic!("split mode must yield a split prompt");
            };
            assert_eq!(system_text, INSTRUCTION_TEMPLATE);
            assert_eq!(user_text, task_directive(timeframe));
        }
    }

    #[test]
    fn merged_mode_contains_template_marker_and_directive() {
        for timeframe in Timeframe::ALL {
            let composed = compose(CompatibilityMode::MergedPrompt, timeframe);
            assert!(composed.system_text().is_none());
            let merged = composed.user_turn_text();
            assert!(merged.starts_with(INSTRUCTION_TEMPLATE));
            assert!(merged.contains(PROMPT_SEPARATOR));
            assert!(merged.contains(IMAGE_ATTACHED_MARKER));
            assert!(merged.ends_with(&task_directive(timeframe)));
        }
    }

    #[test]
    fn directive_substitutes_timeframe_label() {
        assert_eq!(
            task_directive(Timeframe::OneHour),
            "Perform a predictive (bullish/bearish) analysis of this chart image. The timeframe context is: 1 Hour."
        );
        assert!(task_directive(Timeframe::Unspecified).ends_with("Other / Unknown."));
    }

    #[test]
    fn template_demands_verdict_and_disclaimer() {
        for required in [
            "**BULLISH**",
            "**BEARISH**",
            "**NEUTRAL/SIDEWAYS**",
            "DYOR",
            "SPECULATIVE",
            "Answer in English.",
        ] {
            assert!(INSTRUCTION_TEMPLATE.contains(required), "missing {required}");
        }
    }
}
