//! Research run and session handlers.

use crate::{
    AppState,
    events::{ResearchEvent, emitter::sse_response},
    types::{
        ComparisonRequest, FeedbackRequest, ResearchRequest, ResearchResult, ResearchSession,
        Result, SessionWithResults,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Start a research run and stream its progress as Server-Sent Events.
///
/// Each `data:` frame is one [`ResearchEvent`]; the stream ends after
/// `research_complete` or `error`. Disconnecting cancels the run, which is
/// still recorded as a failed result.
#[utoipa::path(
    post,
    path = "/research/stream",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = ResearchEvent),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Session conflict")
    ),
    tag = "research",
    security(("bearer" = []))
)]
pub async fn stream_research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Response> {
    let events = state.research.stream(payload).await?;
    let idle = state.config_manager.config().pipeline.keepalive();
    Ok(sse_response(events, idle))
}

/// Run one query against several models on a single event stream.
#[utoipa::path(
    post,
    path = "/research/compare/stream",
    request_body = ComparisonRequest,
    responses(
        (status = 200, description = "Concatenated event streams", content_type = "text/event-stream", body = ResearchEvent),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Session conflict")
    ),
    tag = "research",
    security(("bearer" = []))
)]
pub async fn compare_research(
    State(state): State<AppState>,
    Json(payload): Json<ComparisonRequest>,
) -> Result<Response> {
    let events = state.research.compare_stream(payload).await?;
    let idle = state.config_manager.config().pipeline.keepalive();
    Ok(sse_response(events, idle))
}

/// Run to completion and return the persisted result.
#[utoipa::path(
    post,
    path = "/research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Run finished (check `success`)", body = ResearchResult),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Session conflict")
    ),
    tag = "research",
    security(("bearer" = []))
)]
pub async fn run_research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<ResearchResult>> {
    Ok(Json(state.research.run(payload).await?))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionListQuery {
    /// Defaults to 20
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub session_id: String,
    /// False when the session did not exist
    pub deleted: bool,
}

#[utoipa::path(
    get,
    path = "/research/sessions",
    params(SessionListQuery),
    responses((status = 200, description = "Recent sessions, newest first", body = [SessionWithResults])),
    tag = "sessions",
    security(("bearer" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionWithResults>>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    Ok(Json(state.research.sessions(limit).await?))
}

#[utoipa::path(
    get,
    path = "/research/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session with its results", body = SessionWithResults),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions",
    security(("bearer" = []))
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionWithResults>> {
    Ok(Json(state.research.session(&session_id).await?))
}

#[utoipa::path(
    put,
    path = "/research/sessions/{session_id}/feedback",
    params(("session_id" = String, Path, description = "Session ID")),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = ResearchSession),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions",
    security(("bearer" = []))
)]
pub async fn update_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<ResearchSession>> {
    Ok(Json(
        state
            .research
            .record_feedback(&session_id, &payload.feedback)
            .await?,
    ))
}

/// Delete a session and its results. Deleting an absent session succeeds.
#[utoipa::path(
    delete,
    path = "/research/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    responses((status = 200, description = "Delete outcome", body = DeleteResponse)),
    tag = "sessions",
    security(("bearer" = []))
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state.research.delete_session(&session_id).await?;
    Ok(Json(DeleteResponse {
        session_id,
        deleted,
    }))
}
