//! Transcript command implementation.

use super::write_output;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::transcript::{clean_captions, extract_video_id, TranscriptSource, YtDlpTranscriptSource};
use anyhow::Result;

/// Run the transcript command.
pub async fn run_transcript(url: &str, output: Option<String>, settings: Settings) -> Result<()> {
    let Some(video_id) = extract_video_id(url) else {
        Output::error(&format!("Could not find a YouTube video ID in '{}'", url));
        return Err(anyhow::anyhow!("Invalid URL: {}", url));
    };

    if let Err(e) = preflight::check(Operation::Transcript, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let source = YtDlpTranscriptSource::new(&settings.transcript);

    let spinner = Output::spinner(&format!("Fetching captions for {}...", video_id));
    let captions = source.fetch_captions(&video_id).await;
    spinner.finish_and_clear();

    let Some(captions) = captions?.filter(|c| !c.is_empty()) else {
        Output::error(&format!("No transcript is available for video {}", video_id));
        return Err(anyhow::anyhow!("No transcript for {}", video_id));
    };

    let transcript = clean_captions(&captions);
    write_output(output.as_deref(), &transcript)?;

    Output::success(&format!(
        "{} captions, {} characters",
        captions.len(),
        transcript.chars().count()
    ));

    Ok(())
}
