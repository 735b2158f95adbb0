//! Server-Sent Event emitter
//!
//! Frames each [`ResearchEvent`] as one `data:` record carrying its JSON,
//! preserving the order in which the pipeline produced them. When the
//! producer stays silent for longer than the idle threshold a `keep-alive`
//! comment is written instead so that proxies do not drop the connection;
//! comments never decode to events.

use super::ResearchEvent;
use axum::{
    http::HeaderName,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Comment text written when no event arrived within the idle threshold.
pub const KEEP_ALIVE_TEXT: &str = "keep-alive";

/// Encode one research event as an SSE record.
pub fn sse_event(event: &ResearchEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize research event: {}", e);
        let fallback = serde_json::json!({
            "type": "error",
            "content": format!("event serialization failed: {}", e),
            "timestamp": event.timestamp,
            "research_id": event.research_id,
            "model": event.model,
        });
        Event::default().data(fallback.to_string())
    })
}

/// Build a streaming `text/event-stream` response.
///
/// The body owns `events`; when the client disconnects the body is dropped,
/// which drops the event stream and lets the producer observe cancellation.
pub fn sse_response<S>(events: S, idle: Duration) -> Response
where
    S: Stream<Item = ResearchEvent> + Send + 'static,
{
    let records = events.map(|event| Ok::<_, Infallible>(sse_event(&event)));
    let keep_alive = KeepAlive::new().interval(idle).text(KEEP_ALIVE_TEXT);

    (
        [(HeaderName::from_static("x-accel-buffering"), "no")],
        Sse::new(records).keep_alive(keep_alive),
    )
        .into_response()
}

/// Decode a raw SSE body back into events, skipping comment records.
pub fn decode(body: &str) -> Vec<ResearchEvent> {
    body.split("\n\n")
        .filter_map(|record| {
            let payload = record
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect::<Vec<_>>()
                .join("\n");
            if payload.is_empty() {
                return None;
            }
            match serde_json::from_str(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Skipping undecodable SSE record: {}", e);
                    None
                }
            }
        })
        .collect()
}
