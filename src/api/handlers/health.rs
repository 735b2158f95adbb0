//! Liveness and model catalogue.

use crate::{
    AppState,
    llm::client::{default_api_base, default_model_name},
    types::ModelKind,
};
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub models: Vec<ModelKind>,
}

/// A supported model with its effective provider settings.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelInfo {
    pub model: ModelKind,
    pub provider: String,
    /// Provider-side model identifier used for runs
    pub model_name: String,
    pub api_base: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "deepbench".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models: ModelKind::ALL.to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/models",
    responses((status = 200, description = "Supported models", body = [ModelInfo])),
    tag = "health"
)]
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    let config = state.config_manager.config();
    let models = ModelKind::ALL
        .iter()
        .map(|&model| {
            let settings = config.provider_settings(model);
            ModelInfo {
                model,
                provider: model.provider_name().to_string(),
                model_name: settings
                    .model
                    .unwrap_or_else(|| default_model_name(model).to_string()),
                api_base: settings
                    .api_base
                    .unwrap_or_else(|| default_api_base(model).to_string()),
            }
        })
        .collect();
    Json(models)
}
