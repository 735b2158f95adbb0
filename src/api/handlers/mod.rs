//! API request handlers.

/// Per-model and history analytics.
pub mod analytics;
/// Liveness and model catalogue.
pub mod health;
/// Research runs (streaming and synchronous) and session management.
pub mod research;
