//! Text completion services.
//!
//! The summarization stages only need "prompt in, text out". This module defines that
//! capability as a trait so the OpenAI backend can be swapped for stubs in tests or for
//! any other OpenAI-compatible server.

mod openai;

pub use openai::OpenAICompletion;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One request to a completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum output size in tokens.
    pub max_tokens: u32,
    /// Constrain the output to a JSON object when the backend supports it.
    pub json_object: bool,
}

/// Failure of a single completion call.
#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    #[error("Rate limit reached: {0}")]
    RateLimited(String),

    #[error("API error{}: {message}", status_suffix(.status))]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty response from completion service")]
    EmptyResponse,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CompletionError {
    /// Whether this failure means the caller is being throttled.
    ///
    /// Structured signals are checked first. Backends that only report errors as text
    /// are matched on "rate limit" or "429".
    pub fn is_rate_limit(&self) -> bool {
        match self {
            CompletionError::RateLimited(_) => true,
            CompletionError::Api {
                status: Some(429), ..
            } => true,
            other => text_indicates_rate_limit(&other.to_string()),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Case-insensitive check for rate-limit wording in an error message.
pub fn text_indicates_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("429")
}

/// Trait for text completion backends.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate text for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
