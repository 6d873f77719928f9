//! Two-stage map/reduce summarization.
//!
//! The map step ([`ChunkSummarizer`]) turns each transcript chunk into a
//! [`ChunkSummary`]; the reduce step ([`Synthesizer`]) merges the ordered summaries
//! into a [`FinalReport`]. Both stages share the same request discipline: a bounded
//! number of attempts, a timeout per call, tolerant JSON extraction and strict
//! required-field validation. When every attempt fails they return
//! [`StageOutcome::Exhausted`] instead of an error, and the caller decides what to do.

mod chunk;
pub mod json;
mod synthesis;

pub use chunk::{ChunkSummarizer, ChunkSummary, Quote};
pub use synthesis::{FinalReport, ResultStatus, Synthesizer, CONFIDENCE_LEVELS};

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::config::CompletionSettings;
use json::parse_structured;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Result of a stage call after its retry budget.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    /// A valid structured result.
    Complete(T),
    /// Every attempt failed.
    Exhausted(Exhaustion),
}

impl<T> StageOutcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, StageOutcome::Complete(_))
    }

    /// The result, discarding the failure details.
    pub fn complete(self) -> Option<T> {
        match self {
            StageOutcome::Complete(value) => Some(value),
            StageOutcome::Exhausted(_) => None,
        }
    }
}

/// Why a stage gave up.
#[derive(Debug, Clone, Error)]
#[error("gave up after {attempts} attempt(s): {cause}")]
pub struct Exhaustion {
    /// Attempts made.
    pub attempts: u32,
    /// Failure of the final attempt.
    pub cause: FailureCause,
}

impl Exhaustion {
    /// Whether the final failure was the completion service throttling us.
    pub fn is_rate_limited(&self) -> bool {
        match &self.cause {
            FailureCause::Completion(err) => err.is_rate_limit(),
            FailureCause::Malformed(_) => false,
        }
    }
}

/// Failure of a single attempt.
#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Generation parameters for one stage.
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: u32,
    /// Ask the backend for a JSON object response.
    pub json_object: bool,
    /// Time allowed for a single call.
    pub timeout: Duration,
}

impl StageOptions {
    /// Options for the chunk (map) stage.
    pub fn for_chunks(settings: &CompletionSettings) -> Self {
        Self::with_max_tokens(settings, settings.chunk_max_tokens)
    }

    /// Options for the synthesis (reduce) stage.
    pub fn for_synthesis(settings: &CompletionSettings) -> Self {
        Self::with_max_tokens(settings, settings.synthesis_max_tokens)
    }

    fn with_max_tokens(settings: &CompletionSettings, max_tokens: u32) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens,
            json_object: settings.json_mode,
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }

    fn request(&self, system: String, user: String) -> CompletionRequest {
        CompletionRequest {
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_object: self.json_object,
        }
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self::for_chunks(&CompletionSettings::default())
    }
}

/// Call the service until it yields a valid `T` or `retry_count + 1` attempts are used.
///
/// Timeouts, service errors, unparseable output and missing fields all count as a
/// failed attempt. There is no backoff between attempts.
pub(crate) async fn request_structured<T: DeserializeOwned>(
    service: &dyn CompletionService,
    request: &CompletionRequest,
    timeout: Duration,
    retry_count: u32,
    stage: &str,
) -> StageOutcome<T> {
    let attempts = retry_count + 1;
    let mut last_cause = None;

    for attempt in 1..=attempts {
        let cause = match tokio::time::timeout(timeout, service.complete(request)).await {
            Err(_) => FailureCause::Completion(CompletionError::Timeout(timeout)),
            Ok(Err(e)) => FailureCause::Completion(e),
            Ok(Ok(text)) => match parse_structured::<T>(&text) {
                Ok(value) => {
                    debug!("{} succeeded on attempt {}/{}", stage, attempt, attempts);
                    return StageOutcome::Complete(value);
                }
                Err(msg) => FailureCause::Malformed(msg),
            },
        };

        warn!("{} attempt {}/{} failed: {}", stage, attempt, attempts, cause);
        last_cause = Some(cause);
    }

    StageOutcome::Exhausted(Exhaustion {
        attempts,
        cause: last_cause
            .unwrap_or_else(|| FailureCause::Malformed("no attempts made".to_string())),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedCompletion, StalledCompletion};
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Answer {
        value: u32,
    }

    fn request() -> CompletionRequest {
        StageOptions::default().request("system".to_string(), "user".to_string())
    }

    #[tokio::test]
    async fn test_retry_recovers_from_malformed_reply() {
        let service = ScriptedCompletion::new(
            vec![Ok("not json".to_string())],
            Ok("{\"value\": 7}".to_string()),
        );

        let outcome: StageOutcome<Answer> =
            request_structured(&service, &request(), Duration::from_secs(5), 1, "test").await;

        assert_eq!(outcome.complete().map(|a| a.value), Some(7));
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_is_returned_not_raised() {
        let service = ScriptedCompletion::always(Ok("{\"other\": 1}".to_string()));

        let outcome: StageOutcome<Answer> =
            request_structured(&service, &request(), Duration::from_secs(5), 1, "test").await;

        match outcome {
            StageOutcome::Exhausted(ex) => {
                assert_eq!(ex.attempts, 2);
                assert!(matches!(ex.cause, FailureCause::Malformed(_)));
                assert!(!ex.is_rate_limited());
            }
            StageOutcome::Complete(_) => panic!("expected exhaustion"),
        }
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_in_exhaustion() {
        let service = ScriptedCompletion::always(Err(CompletionError::Api {
            status: None,
            message: "Error code: 429".to_string(),
        }));

        let outcome: StageOutcome<Answer> =
            request_structured(&service, &request(), Duration::from_secs(5), 0, "test").await;

        match outcome {
            StageOutcome::Exhausted(ex) => {
                assert_eq!(ex.attempts, 1);
                assert!(ex.is_rate_limited());
            }
            StageOutcome::Complete(_) => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let outcome: StageOutcome<Answer> = request_structured(
            &StalledCompletion,
            &request(),
            Duration::from_millis(20),
            2,
            "test",
        )
        .await;

        match outcome {
            StageOutcome::Exhausted(ex) => {
                assert_eq!(ex.attempts, 3);
                assert!(matches!(
                    ex.cause,
                    FailureCause::Completion(CompletionError::Timeout(_))
                ));
            }
            StageOutcome::Complete(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn test_stage_options_from_settings() {
        let settings = CompletionSettings::default();
        let chunk = StageOptions::for_chunks(&settings);
        let synthesis = StageOptions::for_synthesis(&settings);

        assert_eq!(chunk.max_tokens, 1200);
        assert_eq!(synthesis.max_tokens, 2000);
        assert_eq!(chunk.temperature, 0.0);
        assert!(chunk.json_object);
    }
}
