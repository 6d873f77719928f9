//! Map step: one structured summary per transcript chunk.

use super::{request_structured, StageOptions, StageOutcome};
use crate::chunking::Chunk;
use crate::completion::{CompletionRequest, CompletionService};
use crate::config::Prompts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A timestamped quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Timestamp as it appears in the transcript (`mm:ss`).
    pub time: String,
    /// Verbatim quote.
    pub quote: String,
}

/// Structured summary of one chunk. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_index: usize,
    pub chunk_total: usize,
    /// Short factual summary.
    pub chunk_summary: String,
    pub key_points: Vec<String>,
    pub notable_quotes: Vec<Quote>,
    /// Claims and numbers, verbatim.
    pub claims_numbers: Vec<String>,
    /// Statements that need checking.
    pub verify_flags: Vec<String>,
}

/// Summarizes chunks through a completion service.
pub struct ChunkSummarizer {
    service: Arc<dyn CompletionService>,
    options: StageOptions,
    prompts: Prompts,
}

impl ChunkSummarizer {
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

    /// Build the request for one chunk.
    pub fn build_request(&self, chunk: &Chunk) -> CompletionRequest {
        let mut vars = HashMap::new();
        vars.insert("chunk_index".to_string(), chunk.index.to_string());
        vars.insert("chunk_total".to_string(), chunk.total.to_string());

        // The chunk text goes in last so placeholders inside it stay literal.
        let user = self
            .prompts
            .render_with_custom(&self.prompts.chunk.user, &vars)
            .replace("{{chunk_text}}", &chunk.text);

        self.options.request(self.prompts.chunk.system.clone(), user)
    }

    /// Summarize one chunk with up to `retry_count` extra attempts.
    ///
    /// Returns [`StageOutcome::Exhausted`] rather than an error once attempts run out.
    #[instrument(skip(self, chunk), fields(chunk = chunk.index, total = chunk.total))]
    pub async fn summarize_chunk(
        &self,
        chunk: &Chunk,
        retry_count: u32,
    ) -> StageOutcome<ChunkSummary> {
        info!("Summarizing chunk {}/{} ({} chars)", chunk.index, chunk.total, chunk.text.len());

        let request = self.build_request(chunk);
        let stage = format!("Chunk {}/{}", chunk.index, chunk.total);

        match request_structured::<ChunkSummary>(
            self.service.as_ref(),
            &request,
            self.options.timeout,
            retry_count,
            &stage,
        )
        .await
        {
            StageOutcome::Complete(mut summary) => {
                if summary.chunk_index != chunk.index || summary.chunk_total != chunk.total {
                    debug!(
                        "Model reported chunk {}/{}, normalizing to {}/{}",
                        summary.chunk_index, summary.chunk_total, chunk.index, chunk.total
                    );
                    summary.chunk_index = chunk.index;
                    summary.chunk_total = chunk.total;
                }
                StageOutcome::Complete(summary)
            }
            exhausted => exhausted,
        }
    }
}
