//! LLM client abstractions and per-run provider configuration
//!
//! Every research run carries its own [`ProviderConfig`]; nothing here reads
//! credentials from process-global state. Adapters classify failures into
//! transient and permanent so the pipeline can decide whether to retry.

use crate::types::{AppError, ModelKind, ProviderErrorKind, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion with a system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<LLMResponse>;

    /// Generate with tool calling support
    async fn generate_with_tools(
        &self,
        system: &str,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Token usage statistics from an LLM generation call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "end_turn")
    pub finish_reason: String,
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: "stop".to_string(),
            ..Default::default()
        }
    }
}

/// Everything an adapter needs to talk to one provider for one run.
#[derive(Clone)]
pub struct ProviderConfig {
    pub model: ModelKind,
    pub api_key: String,
    pub api_base: String,
    /// Provider-side model identifier, e.g. `gpt-5`
    pub model_name: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model_name", &self.model_name)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Defaults for a model family with the caller's key.
    pub fn new(model: ModelKind, api_key: impl Into<String>) -> Self {
        Self {
            model,
            api_key: api_key.into(),
            api_base: default_api_base(model).to_string(),
            model_name: default_model_name(model).to_string(),
            max_tokens: 8_000,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create a client instance for this provider
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::InvalidInput("API key is required".to_string()));
        }
        match self.model {
            ModelKind::OpenAI => Ok(Arc::new(super::openai::OpenAIClient::new(self)?)),
            // Kimi exposes an Anthropic-compatible messages endpoint
            ModelKind::Anthropic | ModelKind::Kimi => {
                Ok(Arc::new(super::anthropic::AnthropicClient::new(self)?))
            }
        }
    }
}

pub fn default_api_base(model: ModelKind) -> &'static str {
    match model {
        ModelKind::OpenAI => "https://api.openai.com/v1",
        ModelKind::Anthropic => "https://api.anthropic.com/v1",
        ModelKind::Kimi => "https://api.moonshot.ai/anthropic/v1",
    }
}

pub fn default_model_name(model: ModelKind) -> &'static str {
    match model {
        ModelKind::OpenAI => "gpt-5",
        ModelKind::Anthropic => "claude-sonnet-4-20250514",
        ModelKind::Kimi => "kimi-k2-0905-preview",
    }
}

/// Builds clients from per-run provider configuration.
///
/// The HTTP server holds one of these; tests swap in a scripted factory.
#[async_trait]
pub trait LLMClientFactoryTrait: Send + Sync {
    async fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LLMClient>>;
}

/// Factory producing the real HTTP adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LLMClientFactory;

#[async_trait]
impl LLMClientFactoryTrait for LLMClientFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LLMClient>> {
        config.create_client()
    }
}

// ============= Failure classification =============

/// Classify an HTTP status returned by a provider.
pub fn classify_status(status: reqwest::StatusCode) -> ProviderErrorKind {
    if status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ProviderErrorKind::Transient
    } else {
        ProviderErrorKind::Permanent
    }
}

/// Map a non-success provider response into an [`AppError::Provider`].
pub fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    let snippet: String = body.chars().take(300).collect();
    AppError::Provider {
        kind: classify_status(status),
        message: format!("{} API returned {}: {}", provider, status, snippet),
    }
}

/// Map a transport-level failure into an [`AppError::Provider`].
pub fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ProviderErrorKind::Transient
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        ProviderErrorKind::Permanent
    };
    AppError::Provider {
        kind,
        message: format!("{} request failed: {}", provider, err),
    }
}

/// Failure reading or decoding a successful response. A body that timed out
/// or was cut off is transient; one that arrived but does not parse is not.
pub fn body_error(provider: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() || err.is_body() {
        transport_error(provider, err)
    } else {
        AppError::permanent(format!("Malformed {} response: {}", provider, err))
    }
}

pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))
}
