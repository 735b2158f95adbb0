//! # deepbench
//!
//! A streaming deep-research server. Each run takes a query through a fixed
//! sequence of stages (brief, supervised research, final report) against one
//! LLM provider, streams progress as Server-Sent Events and records an
//! immutable result that the analytics layer turns into model comparisons.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use deepbench::db::DatabaseProvider;
//! use deepbench::llm::ProviderConfig;
//! use deepbench::research::{PipelineConfig, ResearchPipeline, RunSpec};
//! use deepbench::types::ModelKind;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! let client = ProviderConfig::new(ModelKind::Anthropic, api_key).create_client()?;
//! let pipeline = Arc::new(ResearchPipeline::new(client, PipelineConfig::default()));
//!
//! let mut run = pipeline.spawn(RunSpec {
//!     research_id: "r-1".into(),
//!     session_id: "s-1".into(),
//!     query: "How do CRDTs handle deletes?".into(),
//!     model: ModelKind::Anthropic,
//! });
//! while let Some(event) = run.events.next().await {
//!     println!("{:?} {:?}", event.event_type, event.stage);
//! }
//! let result = run.result.await?;
//!
//! let store = DatabaseProvider::Memory.create_store().await?;
//! store.create_session("s-1", "How do CRDTs handle deletes?", Default::default()).await?;
//! store.insert_result(&result).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `turso` | Remote Turso database |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui/` |
//!
//! ## Modules
//!
//! - [`research`] - Stage machine, pipeline and run orchestration
//! - [`events`] - Progress events and SSE framing
//! - [`llm`] - Provider clients
//! - [`db`] - Append-only persistence (libsql)
//! - [`analytics`] - Derived views and quality scoring
//! - [`api`] - REST handlers and routes
//! - [`auth`] - Bearer API key middleware
//! - [`types`] - Records, requests and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Derived views over persisted research.
pub mod analytics;
/// HTTP API handlers and routes.
pub mod api;
/// API key authentication.
pub mod auth;
/// Command-line interface.
pub mod cli;
/// Research persistence (libsql).
pub mod db;
/// Research progress events and SSE framing.
pub mod events;
/// LLM provider clients.
pub mod llm;
/// Research stages, pipeline and orchestration.
pub mod research;
/// Core types (records, requests, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use analytics::AnalyticsEngine;
pub use db::{DatabaseProvider, ResearchStore, TursoClient};
pub use llm::{LLMClient, LLMClientFactory, LLMClientFactoryTrait, ProviderConfig};
pub use research::{ResearchPipeline, ResearchService};
pub use types::{AppError, Result};
pub use utils::toml_config::{DeepbenchConfig, DeepbenchConfigManager};

use axum::Router;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<DeepbenchConfigManager>,
    /// Run orchestration and session management
    pub research: ResearchService,
    /// Read-only analytics over the store
    pub analytics: AnalyticsEngine,
}

impl AppState {
    pub fn new(
        config_manager: Arc<DeepbenchConfigManager>,
        store: Arc<dyn ResearchStore>,
        factory: Arc<dyn LLMClientFactoryTrait>,
    ) -> Self {
        Self {
            research: ResearchService::new(store.clone(), factory, config_manager.clone()),
            analytics: AnalyticsEngine::new(store),
            config_manager,
        }
    }
}

/// Build the full application router with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    let router = api::routes::create_router(state.config_manager.clone());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
