//! Summarize command implementation.

use super::write_output;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Orchestrator, PipelineResult};
use anyhow::Result;

/// Run the summarize command.
///
/// The JSON result is written even when the pipeline fails; the command then
/// returns an error so the process exits non-zero.
pub async fn run_summarize(
    url: &str,
    output: Option<String>,
    compact: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Summarize, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(&settings)?;

    let spinner = Output::spinner(&format!("Summarizing {}...", url));
    let result = orchestrator.process_video_url(url).await;
    spinner.finish_and_clear();

    let json = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    write_output(output.as_deref(), &json)?;

    match result {
        PipelineResult::Ok(report) => {
            Output::success(&format!(
                "Summarized {} ({} chunks, confidence: {})",
                report.video_id, report.chunks_count, report.confidence
            ));
            Ok(())
        }
        PipelineResult::Error(err) => {
            Output::error(&format!("{}: {}", err.error_code, err.message));
            Err(anyhow::anyhow!("Summarization failed with {}", err.error_code))
        }
    }
}
