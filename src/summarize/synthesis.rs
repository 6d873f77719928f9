//! Reduce step: merge ordered chunk summaries into the final report.

use super::{request_structured, ChunkSummary, Quote, StageOptions, StageOutcome};
use crate::completion::{CompletionRequest, CompletionService};
use crate::config::Prompts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Values the model is instructed to use for `confidence`. Not enforced.
pub const CONFIDENCE_LEVELS: [&str; 3] = ["high", "medium", "low"];

/// Discriminator carried by every pipeline result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Final structured summary of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub status: ResultStatus,
    pub video_id: String,
    pub video_url: String,
    pub title: String,
    pub final_short_summary: String,
    pub final_key_takeaways: Vec<String>,
    pub top_claims_numbers: Vec<String>,
    pub highlights: Vec<Quote>,
    pub next_steps: Vec<String>,
    /// One of [`CONFIDENCE_LEVELS`] when the model follows instructions.
    pub confidence: String,
    /// Number of chunk summaries the report was built from.
    pub chunks_count: usize,
}

/// The model-authored part of the report. Identity fields are filled in by the caller.
#[derive(Debug, Deserialize)]
struct SynthesisDraft {
    final_short_summary: String,
    final_key_takeaways: Vec<String>,
    top_claims_numbers: Vec<String>,
    highlights: Vec<Quote>,
    next_steps: Vec<String>,
    confidence: String,
}

impl SynthesisDraft {
    fn into_report(
        self,
        video_id: &str,
        video_url: &str,
        title: &str,
        chunks_count: usize,
    ) -> FinalReport {
        FinalReport {
            status: ResultStatus::Ok,
            video_id: video_id.to_string(),
            video_url: video_url.to_string(),
            title: title.to_string(),
            final_short_summary: self.final_short_summary,
            final_key_takeaways: self.final_key_takeaways,
            top_claims_numbers: self.top_claims_numbers,
            highlights: self.highlights,
            next_steps: self.next_steps,
            confidence: self.confidence,
            chunks_count,
        }
    }
}

/// Produces the final report from chunk summaries.
pub struct Synthesizer {
    service: Arc<dyn CompletionService>,
    options: StageOptions,
    prompts: Prompts,
}

impl Synthesizer {
    pub fn new(service: Arc<dyn CompletionService>, options: StageOptions) -> Self {
        Self {
            service,
            options,
            prompts: Prompts::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Build the synthesis request. Summaries are embedded as a JSON array in order.
    pub fn build_request(
        &self,
        summaries: &[ChunkSummary],
        video_id: &str,
        video_url: &str,
        title: &str,
    ) -> CompletionRequest {
        let summaries_json = serde_json::to_string_pretty(summaries).unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("video_id".to_string(), video_id.to_string());
        vars.insert("video_url".to_string(), video_url.to_string());
        vars.insert("title".to_string(), title.to_string());
        vars.insert("chunks_count".to_string(), summaries.len().to_string());

        let user = self
            .prompts
            .render_with_custom(&self.prompts.synthesis.user, &vars)
            .replace("{{chunk_summaries}}", &summaries_json);

        self.options.request(self.prompts.synthesis.system.clone(), user)
    }

    /// Merge `summaries` into a [`FinalReport`] with up to `retry_count` extra attempts.
    ///
    /// `chunks_count` always equals `summaries.len()`, whatever the model returns.
    #[instrument(skip(self, summaries, title), fields(chunks = summaries.len()))]
    pub async fn synthesize(
        &self,
        summaries: &[ChunkSummary],
        video_id: &str,
        video_url: &str,
        title: &str,
        retry_count: u32,
    ) -> StageOutcome<FinalReport> {
        info!("Synthesizing report from {} chunk summaries", summaries.len());

        let request = self.build_request(summaries, video_id, video_url, title);

        match request_structured::<SynthesisDraft>(
            self.service.as_ref(),
            &request,
            self.options.timeout,
            retry_count,
            "Synthesis",
        )
        .await
        {
            StageOutcome::Complete(draft) => {
                if !CONFIDENCE_LEVELS.contains(&draft.confidence.as_str()) {
                    warn!("Model returned unexpected confidence value {:?}", draft.confidence);
                }
                let report = draft.into_report(video_id, video_url, title, summaries.len());
                StageOutcome::Complete(report)
            }
            StageOutcome::Exhausted(ex) => StageOutcome::Exhausted(ex),
        }
    }
}
