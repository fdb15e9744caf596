//! Completion client contract and the Anthropic Messages API implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::prompts::{make_user_message, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, SYSTEM_PROMPT};

/// Completion errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Completion failed: {0}")]
    Completion(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Request to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Completion result with token accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// External completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse>;
}

// =========================================================================
// Anthropic wire types
// =========================================================================

#[derive(Debug, Clone, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl From<MessageResponse> for CompletionResponse {
    fn from(response: MessageResponse) -> Self {
        let text = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let prompt_tokens = response.usage.input_tokens;
        let completion_tokens = response.usage.output_tokens;
        Self {
            text,
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// =========================================================================
// Anthropic client
// =========================================================================

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    /// Create a client with its own HTTP connection pool.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: make_user_message(&request.prompt, &request.context),
            }],
        }
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let preview: String = request.prompt.chars().take(50).collect();
        debug!(prompt = %preview, contexts = request.context.len(), "sending completion request");

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: MessageResponse = response.json().await?;
            return Ok(body.into());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ApiError>(&error_text)
            .map(|e| e.error.message)
            .unwrap_or(error_text);
        error!(status = status.as_u16(), %message, "completion request failed");

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey,
            _ => LlmError::Provider {
                status: status.as_u16(),
                message,
            },
        })
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// =========================================================================
// Mock client
// =========================================================================

/// Canned completion client for tests and offline runs.
pub struct MockCompletionClient {
    text: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockCompletionClient {
    /// Always answer with `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail.
    pub fn failing() -> Self {
        Self {
            text: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of completion calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Completion("mock completion failure".into()));
        }
        let prompt_tokens = request
            .context
            .iter()
            .map(|c| c.split_whitespace().count() as u64)
            .sum::<u64>()
            + request.prompt.split_whitespace().count() as u64;
        let completion_tokens = self.text.split_whitespace().count() as u64;
        Ok(CompletionResponse {
            text: self.text.clone(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        })
    }
}
