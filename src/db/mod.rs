//! Research persistence.
//!
//! - [`traits`]: the [`ResearchStore`] contract, view row types and
//!   [`DatabaseProvider`] selection
//! - [`turso`]: the libsql implementation (in-memory, local file, or remote
//!   Turso with the `turso` feature)
//!
//! Schema: `research_sessions` 1:N `research_results` (cascade on delete),
//! plus the `model_performance_summary`, `comparison_history` and
//! `research_history` views.

pub mod traits;
pub mod turso;

pub use traits::{
    ComparisonSummary, DatabaseProvider, HistoryEntry, ModelPerformance, ResearchStore,
    StageAverage,
};
pub use turso::TursoClient;
