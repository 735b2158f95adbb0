//! Research store abstraction
//!
//! [`ResearchStore`] is the append-only persistence contract for sessions and
//! results, plus the three derived views the analytics layer reads. The
//! libsql-backed [`TursoClient`](super::turso::TursoClient) is the only
//! implementation; [`DatabaseProvider`] picks where it keeps its data.
//!
//! ```rust,ignore
//! use deepbench::db::DatabaseProvider;
//!
//! // In-memory database (default for development/testing)
//! let store = DatabaseProvider::Memory.create_store().await?;
//!
//! // File-based SQLite
//! let store = DatabaseProvider::SQLite { path: "deepbench.db".into() }.create_store().await?;
//! ```

use crate::types::{
    HistoryFilter, ModelKind, ResearchResult, ResearchSession, Result, SessionType,
    SessionWithResults,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Database provider configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DatabaseProvider {
    /// In-memory SQLite database (ephemeral, lost on restart)
    #[default]
    Memory,
    /// File-based SQLite database
    SQLite {
        /// Path to the SQLite database file
        path: String,
    },
    /// Remote Turso database (requires network access)
    #[cfg(feature = "turso")]
    Turso {
        /// The Turso database URL (e.g., `libsql://your-db.turso.io`)
        url: String,
        /// Authentication token for the Turso database
        auth_token: String,
    },
}

impl DatabaseProvider {
    /// Open a store for this provider, creating the schema if needed.
    pub async fn create_store(&self) -> Result<Arc<dyn ResearchStore>> {
        let client = match self {
            DatabaseProvider::Memory => super::turso::TursoClient::new_memory().await?,
            DatabaseProvider::SQLite { path } => super::turso::TursoClient::new_local(path).await?,
            #[cfg(feature = "turso")]
            DatabaseProvider::Turso { url, auth_token } => {
                super::turso::TursoClient::new_remote(url.clone(), auth_token.clone()).await?
            }
        };
        Ok(Arc::new(client))
    }

    /// `":memory:"` or an empty path selects the in-memory database.
    pub fn from_path(path: &str) -> Self {
        if path.is_empty() || path == ":memory:" {
            DatabaseProvider::Memory
        } else {
            DatabaseProvider::SQLite {
                path: path.to_string(),
            }
        }
    }
}

// ============= View rows =============

/// One row of `model_performance_summary`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ModelPerformance {
    pub model: ModelKind,
    pub total_runs: u32,
    /// Seconds, rounded to 2 decimals
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    /// Percentage of successful runs, rounded to 2 decimals
    pub success_rate: f64,
    /// Rounded to 1 decimal
    pub avg_sources: f64,
    /// Rounded to a whole number
    pub avg_word_count: f64,
    pub last_used: DateTime<Utc>,
}

/// One row of `comparison_history`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ComparisonSummary {
    pub session_id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub models_compared: u32,
    /// Absent when the session has no results yet
    pub avg_duration: Option<f64>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub successful_runs: u32,
    pub user_feedback: Option<serde_json::Value>,
}

/// One row of `research_history`: a result joined with its session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct HistoryEntry {
    pub research_id: String,
    pub session_id: String,
    pub query: String,
    pub session_type: SessionType,
    pub model: ModelKind,
    pub duration: f64,
    pub sources_found: u32,
    pub word_count: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Average time spent per stage for one model.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct StageAverage {
    pub stage: String,
    pub avg_seconds: f64,
}

/// Append-only persistence for research sessions and results.
///
/// Every method is one atomic transaction. Results are never updated; the
/// only session mutation is [`update_feedback`](Self::update_feedback).
#[async_trait]
pub trait ResearchStore: Send + Sync {
    // ============== Sessions ==============

    /// Create a session, or confirm an identical one already exists.
    ///
    /// Returns `Conflict` when `session_id` is bound to a different query or
    /// session type.
    async fn create_session(
        &self,
        session_id: &str,
        query: &str,
        session_type: SessionType,
    ) -> Result<ResearchSession>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ResearchSession>>;

    /// Replace the session's feedback and touch `updated_at`.
    async fn update_feedback(
        &self,
        session_id: &str,
        feedback: &serde_json::Value,
    ) -> Result<ResearchSession>;

    /// Delete a session and its results. Returns whether a row was removed;
    /// deleting an absent session is a successful no-op.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Most recent sessions first, each with its results.
    async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionWithResults>>;

    // ============== Results ==============

    /// Append a result.
    ///
    /// Returns `Conflict` on a duplicate `research_id`, a second result for an
    /// individual session, or a repeated model within a comparison session;
    /// `Referential` when the session does not exist.
    async fn insert_result(&self, result: &ResearchResult) -> Result<()>;

    async fn get_result(&self, research_id: &str) -> Result<Option<ResearchResult>>;

    async fn results_for_session(&self, session_id: &str) -> Result<Vec<ResearchResult>>;

    // ============== Views ==============

    async fn model_performance(&self) -> Result<Vec<ModelPerformance>>;

    async fn comparison_history(&self, limit: u32, offset: u32)
    -> Result<Vec<ComparisonSummary>>;

    /// Newest first. `individual_only` restricts to individual sessions.
    async fn research_history(
        &self,
        filter: &HistoryFilter,
        individual_only: bool,
    ) -> Result<Vec<HistoryEntry>>;

    async fn stage_averages(&self, model: ModelKind) -> Result<Vec<StageAverage>>;

    async fn recent_results(&self, model: ModelKind, limit: u32) -> Result<Vec<ResearchResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_path() {
        assert_eq!(DatabaseProvider::from_path(":memory:"), DatabaseProvider::Memory);
        assert_eq!(DatabaseProvider::from_path(""), DatabaseProvider::Memory);
        assert_eq!(
            DatabaseProvider::from_path("data/deepbench.db"),
            DatabaseProvider::SQLite {
                path: "data/deepbench.db".into()
            }
        );
    }
}
