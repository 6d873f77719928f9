//! OpenAI chat-completions backend.

use super::{CompletionError, CompletionRequest, CompletionService};
use crate::config::CompletionSettings;
use crate::error::{Result, TldwError};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::debug;

/// Error codes OpenAI uses for throttling and exhausted quota (both HTTP 429).
const RATE_LIMIT_CODES: [&str; 2] = ["rate_limit_exceeded", "insufficient_quota"];

/// Completion service backed by the OpenAI chat completions API.
pub struct OpenAICompletion {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAICompletion {
    /// Build a client from explicit settings.
    ///
    /// The API key comes from the settings, falling back to `OPENAI_API_KEY`.
    /// A custom `base_url` may run without a key.
    pub fn from_settings(settings: &CompletionSettings) -> Result<Self> {
        let base_url = settings.base_url.as_deref().filter(|b| !b.is_empty());
        let api_key = match (settings.resolved_api_key(), base_url) {
            (Some(key), _) => key,
            (None, Some(_)) => String::new(),
            (None, None) => {
                return Err(TldwError::Config(
                    "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...' \
                     or add api_key under [completion] in the config file"
                        .to_string(),
                ));
            }
        };

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }

        let timeout = Duration::from_secs(settings.timeout_seconds);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TldwError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Client::with_config(config)
                .with_http_client(http_client)
                .with_backoff(no_backoff()),
            model: settings.model.clone(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_error(&self, err: OpenAIError) -> CompletionError {
        match err {
            OpenAIError::ApiError(api) => {
                let code = api.code.as_ref().map(|c| c.to_string()).unwrap_or_default();
                let kind = api.r#type.clone().unwrap_or_default();
                if RATE_LIMIT_CODES
                    .iter()
                    .any(|c| code.contains(c) || kind.contains(c))
                {
                    CompletionError::RateLimited(api.message)
                } else {
                    CompletionError::Api {
                        status: None,
                        message: api.message,
                    }
                }
            }
            OpenAIError::Reqwest(e) if e.is_timeout() => CompletionError::Timeout(self.timeout),
            OpenAIError::Reqwest(e) => CompletionError::Api {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            OpenAIError::InvalidArgument(msg) => CompletionError::InvalidRequest(msg),
            other => CompletionError::Api {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Backoff policy that gives up at once.
///
/// async-openai retries throttled requests on its own for up to 15 minutes by default.
/// Retries belong to the summarization stages, and a 429 has to surface as an error.
fn no_backoff() -> ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

#[async_trait]
impl CompletionService for OpenAICompletion {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| CompletionError::InvalidRequest(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.clone())
                .build()
                .map_err(|e| CompletionError::InvalidRequest(e.to_string()))?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens);
        if request.json_object {
            args.response_format(ResponseFormat::JsonObject);
        }
        let chat_request = args
            .build()
            .map_err(|e| CompletionError::InvalidRequest(e.to_string()))?;

        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            request.user.len()
        );

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| self.map_error(e))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|content| !content.trim().is_empty())
            .cloned()
            .ok_or(CompletionError::EmptyResponse)
    }
}
