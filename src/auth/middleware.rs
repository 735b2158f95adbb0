use crate::types::AppError;
use crate::utils::toml_config::DeepbenchConfigManager;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Require `Authorization: Bearer <key>` when an API key is configured.
///
/// The key is resolved per request so a hot-reloaded `auth.api_key_env`
/// takes effect without a restart.
pub async fn api_key_middleware(
    State(config): State<Arc<DeepbenchConfigManager>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = config.config().api_key() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match provided {
        Some(token) if keys_match(token.trim(), &expected) => next.run(req).await,
        Some(_) => AppError::Auth("Invalid API key".to_string()).into_response(),
        None => AppError::Auth("Missing bearer token".to_string()).into_response(),
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
