use crate::AppState;
use crate::api::handlers::{analytics, health, research};
use crate::auth::middleware::api_key_middleware;
use crate::utils::toml_config::DeepbenchConfigManager;
use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;

pub fn create_router(config_manager: Arc<DeepbenchConfigManager>) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/models", get(health::list_models))
        .route(
            "/openapi.json",
            get(|| async { Json(super::ApiDoc::openapi()) }),
        );

    let protected_routes = Router::new()
        // Runs
        .route("/research", post(research::run_research))
        .route("/research/stream", post(research::stream_research))
        .route("/research/compare/stream", post(research::compare_research))
        // Analytics
        .route("/research/history", get(analytics::research_history))
        .route(
            "/research/history/individual",
            get(analytics::individual_history),
        )
        .route("/research/comparisons", get(analytics::comparison_history))
        .route(
            "/research/models/performance",
            get(analytics::model_performance),
        )
        .route("/research/models/{model}", get(analytics::model_detail))
        // Sessions
        .route("/research/sessions", get(research::list_sessions))
        .route(
            "/research/sessions/{session_id}",
            get(research::get_session).delete(research::delete_session),
        )
        .route(
            "/research/sessions/{session_id}/feedback",
            put(research::update_feedback),
        )
        .layer(middleware::from_fn_with_state(
            config_manager,
            api_key_middleware,
        ));

    public_routes.merge(protected_routes)
}
