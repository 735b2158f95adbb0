//! HTTP API Handlers and Routes
//!
//! # API Endpoints
//!
//! ## Health
//! - `GET /`, `GET /health` - Liveness and supported models
//! - `GET /models` - Model catalogue with effective provider settings
//! - `GET /openapi.json` - OpenAPI document
//!
//! ## Research (`/research`)
//! - `POST /research/stream` - Run and stream events (SSE)
//! - `POST /research/compare/stream` - Several models, one stream (SSE)
//! - `POST /research` - Run to completion, return the result
//!
//! ## Analytics
//! - `GET /research/history` - All runs, filterable
//! - `GET /research/history/individual` - Runs from individual sessions
//! - `GET /research/comparisons` - Comparison sessions with aggregates
//! - `GET /research/models/performance` - Per-model aggregates
//! - `GET /research/models/{model}` - Stage timings and recent runs
//!
//! ## Sessions
//! - `GET /research/sessions` - Recent sessions with results
//! - `GET /research/sessions/{id}` - One session
//! - `PUT /research/sessions/{id}/feedback` - Record feedback
//! - `DELETE /research/sessions/{id}` - Delete with results
//!
//! # Authentication
//!
//! When `auth.api_key_env` names a set variable, every `/research` route
//! requires:
//! ```text
//! Authorization: Bearer <key>
//! ```
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::health::list_models,
        handlers::research::stream_research,
        handlers::research::compare_research,
        handlers::research::run_research,
        handlers::research::list_sessions,
        handlers::research::get_session,
        handlers::research::update_feedback,
        handlers::research::delete_session,
        handlers::analytics::research_history,
        handlers::analytics::individual_history,
        handlers::analytics::comparison_history,
        handlers::analytics::model_performance,
        handlers::analytics::model_detail,
    ),
    components(schemas(
        crate::types::ModelKind,
        crate::types::SessionType,
        crate::types::ResearchRequest,
        crate::types::ComparisonRequest,
        crate::types::ModelRun,
        crate::types::FeedbackRequest,
        crate::types::ResearchSession,
        crate::types::ResearchResult,
        crate::types::SessionWithResults,
        crate::events::ResearchEvent,
        crate::events::EventType,
        crate::research::stage::Stage,
        crate::db::ModelPerformance,
        crate::db::ComparisonSummary,
        crate::db::HistoryEntry,
        crate::db::StageAverage,
        crate::analytics::ScoredHistoryEntry,
        crate::analytics::RecentRun,
        crate::analytics::ModelDetail,
        handlers::health::HealthResponse,
        handlers::health::ModelInfo,
        handlers::research::DeleteResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "research", description = "Research runs"),
        (name = "sessions", description = "Session management"),
        (name = "analytics", description = "Run history and model comparison")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
