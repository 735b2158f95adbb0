//! Analytics handlers. Every response is recomputed from the store.

use crate::{
    AppState,
    analytics::{ModelDetail, ScoredHistoryEntry},
    db::{ComparisonSummary, ModelPerformance},
    types::{HistoryFilter, ModelKind, Result},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

#[utoipa::path(
    get,
    path = "/research/history",
    params(HistoryFilter),
    responses(
        (status = 200, description = "Runs, newest first", body = [ScoredHistoryEntry]),
        (status = 400, description = "Unknown model filter")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn research_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<ScoredHistoryEntry>>> {
    Ok(Json(state.analytics.research_history(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/research/history/individual",
    params(HistoryFilter),
    responses((status = 200, description = "Individual-session runs, newest first", body = [ScoredHistoryEntry])),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn individual_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<ScoredHistoryEntry>>> {
    Ok(Json(
        state.analytics.individual_research_history(&filter).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/research/comparisons",
    params(HistoryFilter),
    responses((status = 200, description = "Comparison sessions, newest first", body = [ComparisonSummary])),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn comparison_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<ComparisonSummary>>> {
    Ok(Json(state.analytics.comparison_history(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/research/models/performance",
    responses((status = 200, description = "Per-model aggregates", body = [ModelPerformance])),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn model_performance(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModelPerformance>>> {
    Ok(Json(state.analytics.model_performance().await?))
}

#[utoipa::path(
    get,
    path = "/research/models/{model}",
    params(("model" = String, Path, description = "openai, anthropic or kimi")),
    responses(
        (status = 200, description = "Model detail", body = ModelDetail),
        (status = 400, description = "Unknown model")
    ),
    tag = "analytics",
    security(("bearer" = []))
)]
pub async fn model_detail(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<ModelDetail>> {
    let model: ModelKind = model.parse()?;
    Ok(Json(state.analytics.model_detail(model).await?))
}
