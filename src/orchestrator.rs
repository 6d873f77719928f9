//! Pipeline orchestrator for tldw.
//!
//! Runs a video URL through every stage in order: validate, fetch captions, clean,
//! chunk, summarize chunks, synthesize. The first failing stage produces an
//! [`ErrorResult`] and nothing after it runs. Collaborator errors never escape
//! [`Orchestrator::process_video_url`]; the caller always gets a [`PipelineResult`].

use crate::chunking::{ChunkingConfig, TextChunker};
use crate::completion::{CompletionService, OpenAICompletion};
use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::summarize::{
    ChunkSummarizer, ChunkSummary, Exhaustion, FinalReport, ResultStatus, StageOptions,
    StageOutcome, Synthesizer,
};
use crate::transcript::{
    canonical_url, extract_video_id, TranscriptCleaner, TranscriptSource, YtDlpTranscriptSource,
};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Machine-readable reason a pipeline run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidUrl,
    NoTranscript,
    TranscriptTooShort,
    ChunkSummarizationFailed,
    SynthesisFailed,
    ApiRateLimit,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::NoTranscript => "no_transcript",
            ErrorCode::TranscriptTooShort => "transcript_too_short",
            ErrorCode::ChunkSummarizationFailed => "chunk_summarization_failed",
            ErrorCode::SynthesisFailed => "synthesis_failed",
            ErrorCode::ApiRateLimit => "api_rate_limit",
            ErrorCode::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    /// Always [`ResultStatus::Error`].
    pub status: ResultStatus,
    pub error_code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// 1-based index of the chunk that could not be summarized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_chunk: Option<usize>,
}

impl ErrorResult {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            error_code,
            message: message.into(),
            failed_chunk: None,
        }
    }

    fn for_chunk(error_code: ErrorCode, message: impl Into<String>, index: usize) -> Self {
        Self {
            failed_chunk: Some(index),
            ..Self::new(error_code, message)
        }
    }
}

/// What [`Orchestrator::process_video_url`] returns. Serializes as a flat object
/// discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineResult {
    Ok(FinalReport),
    Error(ErrorResult),
}

impl PipelineResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, PipelineResult::Ok(_))
    }

    pub fn status(&self) -> ResultStatus {
        match self {
            PipelineResult::Ok(report) => report.status,
            PipelineResult::Error(err) => err.status,
        }
    }
}

impl From<std::result::Result<FinalReport, ErrorResult>> for PipelineResult {
    fn from(result: std::result::Result<FinalReport, ErrorResult>) -> Self {
        match result {
            Ok(report) => PipelineResult::Ok(report),
            Err(err) => PipelineResult::Error(err),
        }
    }
}

/// The main orchestrator for the tldw pipeline.
pub struct Orchestrator {
    source: Arc<dyn TranscriptSource>,
    cleaner: TranscriptCleaner,
    chunker: TextChunker,
    summarizer: ChunkSummarizer,
    synthesizer: Synthesizer,
    retry_count: u32,
    max_concurrent_chunks: usize,
    min_transcript_chars: usize,
}

impl Orchestrator {
    /// Create an orchestrator backed by yt-dlp and the configured completion API.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        info!("Using completion model {}", settings.completion.model);
        let completion: Arc<dyn CompletionService> =
            Arc::new(OpenAICompletion::from_settings(&settings.completion)?);
        let source: Arc<dyn TranscriptSource> =
            Arc::new(YtDlpTranscriptSource::new(&settings.transcript));

        Ok(Self::with_components(settings, prompts, source, completion))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: &Settings,
        prompts: Prompts,
        source: Arc<dyn TranscriptSource>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let summarizer = ChunkSummarizer::new(
            completion.clone(),
            StageOptions::for_chunks(&settings.completion),
        )
        .with_prompts(prompts.clone());
        let synthesizer =
            Synthesizer::new(completion, StageOptions::for_synthesis(&settings.completion))
                .with_prompts(prompts);

        Self {
            source,
            cleaner: TranscriptCleaner::new(),
            chunker: TextChunker::new(ChunkingConfig::from(&settings.chunking)),
            summarizer,
            synthesizer,
            retry_count: settings.summarization.retry_count,
            max_concurrent_chunks: settings.summarization.max_concurrent_chunks,
            min_transcript_chars: settings.summarization.min_transcript_chars,
        }
    }

    /// Summarize a video. Never fails: every problem becomes an [`ErrorResult`].
    #[instrument(skip(self))]
    pub async fn process_video_url(&self, url: &str) -> PipelineResult {
        let result = match AssertUnwindSafe(self.run(url)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ErrorResult::new(
                ErrorCode::UnknownError,
                format!("Unexpected failure: {}", panic_message(payload.as_ref())),
            )),
        };
        match &result {
            Ok(report) => {
                info!("Summarized {} from {} chunks", report.video_id, report.chunks_count)
            }
            Err(err) => warn!("Pipeline failed with {}: {}", err.error_code, err.message),
        }
        result.into()
    }

    async fn transcript_for(&self, video_id: &str) -> std::result::Result<String, ErrorResult> {
        let captions = match self.source.fetch_captions(video_id).await {
            Ok(Some(captions)) if !captions.is_empty() => captions,
            Ok(_) => {
                return Err(ErrorResult::new(
                    ErrorCode::NoTranscript,
                    format!("No transcript is available for video {}", video_id),
                ));
            }
            Err(e) => {
                return Err(ErrorResult::new(
                    ErrorCode::NoTranscript,
                    format!("Could not fetch the transcript for video {}: {}", video_id, e),
                ));
            }
        };

        Ok(self.cleaner.clean(&captions))
    }

    async fn run(&self, url: &str) -> std::result::Result<FinalReport, ErrorResult> {
        let video_id = parse_video_id(url)?;
        let video_url = canonical_url(&video_id);

        let transcript = self.transcript_for(&video_id).await?;
        let length = transcript.chars().count();
        if length < self.min_transcript_chars {
            return Err(ErrorResult::new(
                ErrorCode::TranscriptTooShort,
                format!(
                    "Transcript has {} characters, at least {} are needed",
                    length, self.min_transcript_chars
                ),
            ));
        }
        info!("Transcript has {} characters", length);

        let chunks = self.chunker.chunk(&transcript);
        if chunks.is_empty() {
            return Err(ErrorResult::new(
                ErrorCode::UnknownError,
                "Chunking produced no chunks",
            ));
        }
        info!("Split transcript into {} chunks", chunks.len());

        let summaries = self.summarize_chunks(&chunks).await?;

        match self
            .synthesizer
            .synthesize(&summaries, &video_id, &video_url, "", self.retry_count)
            .await
        {
            StageOutcome::Complete(report) => Ok(report),
            StageOutcome::Exhausted(ex) => {
                Err(stage_failure(&ex, ErrorCode::SynthesisFailed, None))
            }
        }
    }

    /// Summarize every chunk with at most `max_concurrent_chunks` calls in flight.
    ///
    /// Summaries come back in chunk order. The first failed chunk in that order ends
    /// the stage and the remaining in-flight calls are dropped.
    async fn summarize_chunks(
        &self,
        chunks: &[crate::chunking::Chunk],
    ) -> std::result::Result<Vec<ChunkSummary>, ErrorResult> {
        let retry_count = self.retry_count;
        let mut outcomes = stream::iter(chunks)
            .map(|chunk| async move {
                (chunk.index, self.summarizer.summarize_chunk(chunk, retry_count).await)
            })
            .buffered(self.max_concurrent_chunks.max(1));

        let mut summaries = Vec::with_capacity(chunks.len());
        while let Some((index, outcome)) = outcomes.next().await {
            match outcome {
                StageOutcome::Complete(summary) => summaries.push(summary),
                StageOutcome::Exhausted(ex) => {
                    return Err(stage_failure(
                        &ex,
                        ErrorCode::ChunkSummarizationFailed,
                        Some(index),
                    ));
                }
            }
        }

        Ok(summaries)
    }
}

fn parse_video_id(url: &str) -> std::result::Result<String, ErrorResult> {
    extract_video_id(url).ok_or_else(|| {
        ErrorResult::new(
            ErrorCode::InvalidUrl,
            format!("Could not find a YouTube video ID in '{}'", url.trim()),
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "a pipeline stage panicked"
    }
}

/// Map an exhausted stage to its error, reclassifying throttling as `api_rate_limit`.
fn stage_failure(ex: &Exhaustion, code: ErrorCode, chunk: Option<usize>) -> ErrorResult {
    let code = if ex.is_rate_limited() {
        ErrorCode::ApiRateLimit
    } else {
        code
    };

    let message = match chunk {
        Some(index) => format!("Summarizing chunk {} failed: {}", index, ex),
        None => format!("Synthesis failed: {}", ex),
    };

    match chunk {
        Some(index) => ErrorResult::for_chunk(code, message, index),
        None => ErrorResult::new(code, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use crate::summarize::testing::ScriptedCompletion;
    use crate::summarize::Quote;
    use crate::transcript::{clean_captions, CaptionEntry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VIDEO_ID: &str = "dQw4w9WgXcQ";
    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    /// Serves fixed captions and counts calls.
    struct StubSource {
        captions: Option<Vec<CaptionEntry>>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn with(captions: Option<Vec<CaptionEntry>>) -> Self {
            Self {
                captions,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                captions: None,
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptSource for StubSource {
        async fn fetch_captions(&self, _video_id: &str) -> Result<Option<Vec<CaptionEntry>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::TldwError::ToolFailed("connection reset".to_string()));
            }
            Ok(self.captions.clone())
        }
    }

    fn captions(count: usize) -> Vec<CaptionEntry> {
        (0..count)
            .map(|i| {
                CaptionEntry::new(
                    format!("This is sentence number {} of the talk.", i),
                    (i * 4) as f64,
                    4.0,
                )
            })
            .collect()
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.chunking.target_chars = 300;
        settings.chunking.overlap_chars = 20;
        settings.summarization.max_concurrent_chunks = 2;
        settings
    }

    /// Caption count that chunks into exactly `wanted` chunks under `settings()`.
    fn captions_for_chunks(wanted: usize) -> Vec<CaptionEntry> {
        let chunker = TextChunker::new(ChunkingConfig::from(&settings().chunking));
        (1..200)
            .map(captions)
            .find(|c| chunker.chunk(&clean_captions(c)).len() == wanted)
            .expect("no caption count yields the wanted chunk total")
    }

    fn chunk_json() -> String {
        serde_json::json!({
            "chunk_index": 1,
            "chunk_total": 1,
            "chunk_summary": "The speaker counts sentences.",
            "key_points": ["Sentences are numbered"],
            "notable_quotes": [
                {"time": "00:04", "quote": "This is sentence number 1 of the talk."}
            ],
            "claims_numbers": [],
            "verify_flags": []
        })
        .to_string()
    }

    fn report_json() -> String {
        serde_json::json!({
            "status": "ok",
            "video_id": VIDEO_ID,
            "video_url": URL,
            "title": "",
            "final_short_summary": "A talk made of numbered sentences.",
            "final_key_takeaways": ["Sentences are numbered"],
            "top_claims_numbers": [],
            "highlights": [{"time": "00:04", "quote": "This is sentence number 1 of the talk."}],
            "next_steps": [],
            "confidence": "high",
            "chunks_count": 3
        })
        .to_string()
    }

    fn orchestrator(
        source: Arc<StubSource>,
        completion: Arc<ScriptedCompletion>,
    ) -> Orchestrator {
        Orchestrator::with_components(&settings(), Prompts::default(), source, completion)
    }

    fn expect_error(result: PipelineResult) -> ErrorResult {
        match result {
            PipelineResult::Error(err) => err,
            PipelineResult::Ok(report) => panic!("expected an error, got {:?}", report),
        }
    }

    #[tokio::test]
    async fn test_invalid_url_touches_no_collaborator() {
        let source = Arc::new(StubSource::with(Some(captions(50))));
        let completion = Arc::new(ScriptedCompletion::always(Ok(chunk_json())));
        let pipeline = orchestrator(source.clone(), completion.clone());

        let err = expect_error(pipeline.process_video_url("not a url").await);

        assert_eq!(err.error_code, ErrorCode::InvalidUrl);
        assert_eq!(err.status, ResultStatus::Error);
        assert_eq!(source.calls(), 0);
        assert_eq!(completion.calls(), 0);

        let value = serde_json::to_value(PipelineResult::Error(err)).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error_code"], "invalid_url");
        assert!(value.get("failed_chunk").is_none());
    }

    #[tokio::test]
    async fn test_short_transcript_stops_before_chunking() {
        // "[00:00] " plus 32 characters of text: 40 characters cleaned.
        let entries = vec![CaptionEntry::new("Thanks for watching, see you!!!!", 0.0, 2.0)];
        assert_eq!(clean_captions(&entries).chars().count(), 40);

        let source = Arc::new(StubSource::with(Some(entries)));
        let completion = Arc::new(ScriptedCompletion::always(Ok(chunk_json())));
        let pipeline = orchestrator(source, completion.clone());

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::TranscriptTooShort);
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_captions_map_to_no_transcript() {
        let completion = Arc::new(ScriptedCompletion::always(Ok(chunk_json())));

        let none = orchestrator(Arc::new(StubSource::with(None)), completion.clone());
        let err = expect_error(none.process_video_url(URL).await);
        assert_eq!(err.error_code, ErrorCode::NoTranscript);

        let empty = orchestrator(Arc::new(StubSource::with(Some(vec![]))), completion.clone());
        let err = expect_error(empty.process_video_url(URL).await);
        assert_eq!(err.error_code, ErrorCode::NoTranscript);

        let broken = orchestrator(Arc::new(StubSource::failing()), completion.clone());
        let err = expect_error(broken.process_video_url(URL).await);
        assert_eq!(err.error_code, ErrorCode::NoTranscript);
        assert!(err.message.contains("connection reset"));

        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported_as_such() {
        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let completion = Arc::new(ScriptedCompletion::always(Err(CompletionError::Api {
            status: None,
            message: "Error code: 429 - Too Many Requests".to_string(),
        })));
        let pipeline = orchestrator(source, completion);

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::ApiRateLimit);
        assert_eq!(err.failed_chunk, Some(1));
    }

    #[tokio::test]
    async fn test_failed_chunk_is_identified() {
        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let refusal = Ok("I cannot help with that.".to_string());
        let completion = Arc::new(ScriptedCompletion::always(refusal));
        let pipeline = orchestrator(source, completion);

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::ChunkSummarizationFailed);
        assert_eq!(err.failed_chunk, Some(1));

        let value = serde_json::to_value(PipelineResult::Error(err)).unwrap();
        assert_eq!(value["failed_chunk"], 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure() {
        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let completion = Arc::new(ScriptedCompletion::new(
            vec![Ok(chunk_json()), Ok(chunk_json()), Ok(chunk_json())],
            Ok("{\"final_short_summary\": \"incomplete\"}".to_string()),
        ));
        let pipeline = orchestrator(source, completion.clone());

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::SynthesisFailed);
        assert_eq!(err.failed_chunk, None);
        // Three chunks plus two synthesis attempts.
        assert_eq!(completion.calls(), 5);
    }

    #[tokio::test]
    async fn test_synthesis_rate_limit_is_reported_as_such() {
        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let completion = Arc::new(ScriptedCompletion::new(
            vec![Ok(chunk_json()), Ok(chunk_json()), Ok(chunk_json())],
            Err(CompletionError::Api {
                status: Some(429),
                message: "Too Many Requests".to_string(),
            }),
        ));
        let pipeline = orchestrator(source, completion.clone());

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::ApiRateLimit);
        assert_eq!(err.failed_chunk, None);
        assert!(err.message.starts_with("Synthesis failed"));
        assert_eq!(completion.calls(), 5);

        let value = serde_json::to_value(PipelineResult::Error(err)).unwrap();
        assert_eq!(value["error_code"], "api_rate_limit");
        assert!(value.get("failed_chunk").is_none());
    }

    /// Panics inside the fetch, standing in for a bug in any stage.
    struct PanickingSource;

    #[async_trait]
    impl TranscriptSource for PanickingSource {
        async fn fetch_captions(&self, video_id: &str) -> Result<Option<Vec<CaptionEntry>>> {
            panic!("caption index out of range for {}", video_id);
        }
    }

    #[tokio::test]
    async fn test_unexpected_panic_becomes_unknown_error() {
        let completion = Arc::new(ScriptedCompletion::always(Ok(chunk_json())));
        let pipeline = Orchestrator::with_components(
            &settings(),
            Prompts::default(),
            Arc::new(PanickingSource),
            completion.clone(),
        );

        let err = expect_error(pipeline.process_video_url(URL).await);

        assert_eq!(err.error_code, ErrorCode::UnknownError);
        assert!(err.message.contains("caption index out of range"));
        assert_eq!(err.failed_chunk, None);
        assert_eq!(completion.calls(), 0);
    }

    #[test]
    fn test_panic_message_reads_both_payload_kinds() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(literal.as_ref()), "boom");

        let formatted: Box<dyn Any + Send> = Box::new(format!("index {}", 3));
        assert_eq!(panic_message(formatted.as_ref()), "index 3");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "a pipeline stage panicked");
    }

    #[tokio::test]
    async fn test_three_chunks_end_to_end() {
        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let completion = Arc::new(ScriptedCompletion::new(
            vec![Ok(chunk_json()), Ok(chunk_json()), Ok(chunk_json())],
            Ok(report_json()),
        ));
        let pipeline = orchestrator(source, completion.clone());

        let result = pipeline.process_video_url("https://youtu.be/dQw4w9WgXcQ").await;

        let expected = FinalReport {
            status: ResultStatus::Ok,
            video_id: VIDEO_ID.to_string(),
            video_url: URL.to_string(),
            title: String::new(),
            final_short_summary: "A talk made of numbered sentences.".to_string(),
            final_key_takeaways: vec!["Sentences are numbered".to_string()],
            top_claims_numbers: vec![],
            highlights: vec![Quote {
                time: "00:04".to_string(),
                quote: "This is sentence number 1 of the talk.".to_string(),
            }],
            next_steps: vec![],
            confidence: "high".to_string(),
            chunks_count: 3,
        };
        assert_eq!(result, PipelineResult::Ok(expected));
        assert!(result.is_ok());
        assert_eq!(completion.calls(), 4);

        // The synthesis prompt carries all three summaries, in order.
        let requests = completion.requests.lock().unwrap();
        let synthesis = &requests[3].user;
        assert_eq!(synthesis.matches("\"chunk_index\": ").count(), 3);
        let first = synthesis.find("\"chunk_index\": 1").unwrap();
        let third = synthesis.find("\"chunk_index\": 3").unwrap();
        assert!(first < third);
    }

    #[tokio::test]
    async fn test_sequential_mode_matches_concurrent() {
        let mut sequential = settings();
        sequential.summarization.max_concurrent_chunks = 0;

        let source = Arc::new(StubSource::with(Some(captions_for_chunks(3))));
        let completion = Arc::new(ScriptedCompletion::new(
            vec![Ok(chunk_json()), Ok(chunk_json()), Ok(chunk_json())],
            Ok(report_json()),
        ));
        let pipeline =
            Orchestrator::with_components(&sequential, Prompts::default(), source, completion);

        let result = pipeline.process_video_url(VIDEO_ID).await;
        tokio_test::assert_ok!(serde_json::to_string(&result));
        assert_eq!(result.status(), ResultStatus::Ok);
    }

    #[test]
    fn test_error_codes_serialize_snake_case() {
        let codes = [
            ErrorCode::InvalidUrl,
            ErrorCode::NoTranscript,
            ErrorCode::TranscriptTooShort,
            ErrorCode::ChunkSummarizationFailed,
            ErrorCode::SynthesisFailed,
            ErrorCode::ApiRateLimit,
            ErrorCode::UnknownError,
        ];

        for code in codes {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }
}
