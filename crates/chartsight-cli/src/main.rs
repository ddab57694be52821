use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chartsight_contracts::events::EventWriter;
use chartsight_contracts::models::{ModelSelector, VISION_CAPABILITY};
use chartsight_contracts::runs::receipts::RECEIPT_FILE_NAME;
use chartsight_contracts::timeframe::Timeframe;
use chartsight_engine::{
    mime_for_path, AnalysisPipeline, AnalysisResult, CompatibilityMode, GeminiConfig,
    GeminiProvider, RESULT_DISCLAIMER,
};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(
    name = "chartsight",
    version,
    about = "Bullish/bearish read of a chart screenshot from a hosted vision model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    Timeframes,
    Models,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value = "1-hour")]
    timeframe: String,
    #[arg(long)]
    mime: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print the result as a JSON object instead of text.
    #[arg(long)]
    json: bool,
}

const EXIT_ANALYSIS_FAILED: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chartsight error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Timeframes => {
            print!("{}", format_timeframes());
            Ok(0)
        }
        Command::Models => {
            let selector = ModelSelector::new(None);
            for model in selector.registry.by_capability(VISION_CAPABILITY) {
                let shape = if model.supports_system_instruction {
                    "split_instruction"
                } else {
                    "merged_prompt"
                };
                println!("{}\t{}\t{shape}", model.name, model.provider);
            }
            Ok(0)
        }
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let selection = ModelSelector::new(None)
        .select(args.model.as_deref(), VISION_CAPABILITY)
        .map_err(anyhow::Error::msg)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        eprintln!("{reason}");
    }

    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed reading {}", args.image.display()))?;
    let declared_mime = resolve_mime(&args.image, args.mime.as_deref())?;

    let provider = GeminiProvider::new(GeminiConfig::from_env(selection.model.name.clone()));
    let mut pipeline = AnalysisPipeline::new(provider)
        .with_known_incompatible(!selection.model.supports_system_instruction);
    if let Some(events) = event_writer(args.out.as_deref(), args.events.as_deref()) {
        pipeline = pipeline.with_events(events);
    }
    if let Some(out) = args.out.as_ref() {
        fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
        pipeline = pipeline.with_receipt(out.join(RECEIPT_FILE_NAME));
    }

    let result = pipeline.run_analysis(bytes, &declared_mime, &args.timeframe);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report_json(&result))?);
        return Ok(if result.is_ok() { 0 } else { EXIT_ANALYSIS_FAILED });
    }
    let (rendered, code) = present(&result);
    if code == 0 {
        println!("{rendered}");
    } else {
        eprintln!("{rendered}");
    }
    Ok(code)
}

fn resolve_mime(path: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(mime) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
        return Ok(mime.to_string());
    }
    let Some(mime) = mime_for_path(path) else {
        bail!(
            "cannot infer image type from {}; pass --mime image/png or image/jpeg",
            path.display()
        );
    };
    Ok(mime.to_string())
}

fn event_writer(out: Option<&Path>, events: Option<&Path>) -> Option<EventWriter> {
    match (out, events) {
        (_, Some(path)) => {
            let run_id = out
                .and_then(|dir| dir.file_name())
                .and_then(|value| value.to_str())
                .unwrap_or("analysis")
                .to_string();
            Some(EventWriter::new(path, run_id))
        }
        (Some(dir), None) => Some(EventWriter::for_run_dir(dir)),
        (None, None) => None,
    }
}

/// Text for the terminal and the process exit code.
fn present(result: &AnalysisResult) -> (String, i32) {
    match result {
        Ok(report) => {
            let mut out = String::from("AI Analysis Result");
            if report.mode == CompatibilityMode::MergedPrompt {
                out.push_str(" (merged prompt)");
            }
            out.push_str(":\n\n");
            out.push_str(&report.render());
            (out, 0)
        }
        Err(failure) => (
            format!("error [{}]: {}", failure.kind(), failure.detail()),
            EXIT_ANALYSIS_FAILED,
        ),
    }
}

fn format_timeframes() -> String {
    let default = Timeframe::default();
    Timeframe::ALL
        .into_iter()
        .map(|timeframe| {
            let marker = if timeframe == default { " (default)" } else { "" };
            format!("{}\t{}{marker}\n", timeframe.code(), timeframe.label())
        })
        .collect()
}

fn report_json(result: &AnalysisResult) -> serde_json::Value {
    match result {
        Ok(report) => json!({
            "status": "ok",
            "text": report.text,
            "disclaimer": RESULT_DISCLAIMER,
            "timeframe": report.timeframe,
            "model": report.model,
            "mode": report.mode.as_str(),
            "attempts": report.attempts,
        }),
        Err(failure) => json!({
            "status": "failed",
            "kind": failure.kind().as_str(),
            "detail": failure.detail(),
        }),
    }
}
