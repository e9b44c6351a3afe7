//! Model interaction: one Messages API call per deck.
//!
//! The request is a single user message holding the instruction prompt and
//! the rendered deck. There is no retry: a call either yields the reply text
//! or a classified [`ModelReply::Failure`], and the coordinator records that
//! deck as failed and moves on.
//!
//! ## Failure classification
//!
//! | Response | Kind |
//! |----------|------|
//! | connect error / timeout | `Network` |
//! | non-2xx with `{"error":{"message":..}}` | `Auth` (401/403) or `Api` |
//! | non-2xx whose body looks like markup | `Auth` |
//! | 2xx without `content[0].text` | `MalformedResponse` |
//!
//! The HTTP client sits behind [`CompletionProvider`] so the coordinator can
//! be driven by a scripted provider in tests.

use crate::config::ConversionConfig;
use crate::error::{FileError, SopError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Length of the raw-body excerpt attached to diagnostics.
const EXCERPT_CHARS: usize = 500;

/// The prompt and generation settings for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Why a model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Auth,
    Api,
    MalformedResponse,
}

/// Outcome of a single model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Success { text: String, usage: Usage },
    Failure { kind: FailureKind, message: String },
}

impl ModelReply {
    fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ModelReply::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Convert into the per-file error taxonomy, attaching the deck name.
    pub fn into_result(self, file: &str) -> Result<(String, Usage), FileError> {
        let file = file.to_string();
        match self {
            ModelReply::Success { text, usage } => Ok((text, usage)),
            ModelReply::Failure { kind, message: detail } => Err(match kind {
                FailureKind::Network => FileError::NetworkFailure { file, detail },
                FailureKind::Auth => FileError::AuthFailure { file, detail },
                FailureKind::Api => FileError::ApiError { file, detail },
                FailureKind::MalformedResponse => FileError::MalformedResponse { file, detail },
            }),
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Perform one completion. Never panics on transport or format errors;
    /// those come back as [`ModelReply::Failure`].
    async fn complete(&self, request: &ModelRequest) -> ModelReply;
}

/// Client for the Anthropic Messages endpoint.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    api_version: String,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        api_version: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, SopError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SopError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            timeout_secs,
        })
    }

    /// Build a client from the conversion config.
    ///
    /// Fails with [`SopError::MissingCredential`] when no API key is set.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, SopError> {
        let key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(SopError::MissingCredential)?;
        Self::new(
            key,
            config.api_url.clone(),
            config.api_version.clone(),
            config.api_timeout_secs,
        )
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &ModelRequest) -> ModelReply {
        let start = Instant::now();
        let body = MessagesRequest {
            model: &request.model,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "Sending request to Messages API"
        );

        let response = match self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return network_failure(&e, self.timeout_secs),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return network_failure(&e, self.timeout_secs),
        };

        let reply = classify_response(status, &text);
        match &reply {
            ModelReply::Success { usage, .. } => debug!(
                "Model replied in {:?}: {} input tokens, {} output tokens",
                start.elapsed(),
                usage.input_tokens,
                usage.output_tokens
            ),
            ModelReply::Failure { kind, message } => {
                error!("Model call failed ({:?}, HTTP {}): {}", kind, status, message)
            }
        }
        reply
    }
}

fn network_failure(e: &reqwest::Error, timeout_secs: u64) -> ModelReply {
    if e.is_timeout() {
        ModelReply::failure(
            FailureKind::Network,
            format!("request timed out after {timeout_secs}s"),
        )
    } else {
        ModelReply::failure(FailureKind::Network, format!("Network error: {e}"))
    }
}

/// Classify an HTTP response from the Messages endpoint.
pub(crate) fn classify_response(status: StatusCode, body: &str) -> ModelReply {
    if status.is_success() {
        return match serde_json::from_str::<MessagesResponse>(body) {
            Ok(resp) => match resp.content.into_iter().next().and_then(|b| b.text) {
                Some(text) => ModelReply::Success {
                    text,
                    usage: resp.usage.unwrap_or_default(),
                },
                None => ModelReply::failure(
                    FailureKind::MalformedResponse,
                    format!("reply has no text content; body: {}", excerpt(body)),
                ),
            },
            Err(e) => ModelReply::failure(
                FailureKind::MalformedResponse,
                format!("Invalid API response format ({e}); body: {}", excerpt(body)),
            ),
        };
    }

    let auth_status = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
    let status_kind = if auth_status {
        FailureKind::Auth
    } else {
        FailureKind::Api
    };

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let message = envelope
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
            ModelReply::failure(status_kind, message)
        }
        Err(_) if body.trim_start().starts_with('<') => ModelReply::failure(
            FailureKind::Auth,
            "Authentication failed. Please check your API key.",
        ),
        Err(_) => ModelReply::failure(
            status_kind,
            format!("API error: {}; body: {}", status.as_u16(), excerpt(body)),
        ),
    }
}

/// The first [`EXCERPT_CHARS`] characters of `body`.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
