//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{Result, TldwError};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Summarizing needs yt-dlp and an API key.
    Summarize,
    /// Fetching a transcript only needs yt-dlp.
    Transcript,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Summarize => {
            check_api_key(settings)?;
            check_tool(&settings.transcript.ytdlp_path)?;
        }
        Operation::Transcript => {
            check_tool(&settings.transcript.ytdlp_path)?;
        }
    }
    Ok(())
}

/// Check that an API key is configured or exported.
fn check_api_key(settings: &Settings) -> Result<()> {
    // Local OpenAI-compatible servers often run without a key.
    let base_url = settings.completion.base_url.as_deref();
    if base_url.is_some_and(|b| !b.is_empty()) {
        return Ok(());
    }

    match settings.completion.resolved_api_key() {
        Some(_) => Ok(()),
        None => Err(TldwError::Config(
            "No API key. Set completion.api_key in the config or export OPENAI_API_KEY='sk-...'"
                .to_string(),
        )),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(TldwError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TldwError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(TldwError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
