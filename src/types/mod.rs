use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

// ============= Model & Session Kinds =============

/// Supported research model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    OpenAI,
    Anthropic,
    Kimi,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::OpenAI, ModelKind::Anthropic, ModelKind::Kimi];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::OpenAI => "openai",
            ModelKind::Anthropic => "anthropic",
            ModelKind::Kimi => "kimi",
        }
    }

    /// Human-readable provider company name
    pub fn provider_name(&self) -> &'static str {
        match self {
            ModelKind::OpenAI => "OpenAI",
            ModelKind::Anthropic => "Anthropic",
            ModelKind::Kimi => "Moonshot AI",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ModelKind::OpenAI),
            "anthropic" => Ok(ModelKind::Anthropic),
            "kimi" => Ok(ModelKind::Kimi),
            other => Err(AppError::InvalidInput(format!(
                "Unsupported model: {}. Available models: openai, anthropic, kimi",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Individual,
    Comparison,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Individual => "individual",
            SessionType::Comparison => "comparison",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(SessionType::Individual),
            "comparison" => Some(SessionType::Comparison),
            _ => None,
        }
    }
}

// ============= Persisted Records =============

/// Per-stage elapsed wall time in seconds, keyed by stage name.
pub type StageTimings = BTreeMap<String, f64>;

/// A grouping of one or more research runs that share a query.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ResearchSession {
    pub session_id: String,
    pub query: String,
    pub session_type: SessionType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The immutable outcome of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ResearchResult {
    pub research_id: String,
    pub session_id: String,
    pub model: ModelKind,
    /// Seconds from initialization to the terminal state
    pub duration: f64,
    #[schema(value_type = Object)]
    pub stage_timings: StageTimings,
    pub sources_found: u32,
    pub word_count: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub report_content: String,
    pub supervisor_tools_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_brief: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A session together with every result attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionWithResults {
    #[serde(flatten)]
    pub session: ResearchSession,
    pub results: Vec<ResearchResult>,
}

// ============= API Request/Response Types =============

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    pub query: String,
    pub model: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<SessionType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelRun {
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComparisonRequest {
    pub query: String,
    pub runs: Vec<ModelRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    pub feedback: serde_json::Value,
}

/// Filters shared by the history endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams, PartialEq)]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    /// Only runs of this model
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    /// Case-insensitive substring of the query text
    #[serde(default)]
    pub search: Option<String>,
    /// Defaults to 50, capped at 500
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl HistoryFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

// ============= Tool Types =============

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

// ============= Error Types =============

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Timeouts, rate limits, upstream 5xx, dropped connections
    Transient,
    /// Authentication failures and malformed requests
    Permanent,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider error: {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Referential integrity violation: {0}")]
    Referential(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Provider {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        AppError::Provider {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Provider {
                kind: ProviderErrorKind::Transient,
                ..
            }
        )
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Referential(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
