//! Research progress events
//!
//! A research run reports its progress as an ordered sequence of
//! [`ResearchEvent`]s. The set of event types is closed; consumers can rely
//! on every run starting with `session_start` (or `stage_start`) and ending
//! with exactly one of `research_complete` or `error`.
//!
//! The [`emitter`] module turns that sequence into Server-Sent Event frames.

/// Server-Sent Event framing and keep-alive handling.
pub mod emitter;

use crate::research::stage::Stage;
use crate::types::ModelKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    StageStart,
    StageUpdate,
    ResearchStep,
    ResearchFinding,
    ResearchComplete,
    Error,
}

impl EventType {
    /// `research_complete` and `error` close a run's stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::ResearchComplete | EventType::Error)
    }
}

/// One timestamped progress notification of a research run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ResearchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Seconds; set on stage exits and on the terminal event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Run this event belongs to
    pub research_id: String,
    pub model: ModelKind,
}

impl ResearchEvent {
    pub fn new(event_type: EventType, research_id: &str, model: ModelKind) -> Self {
        Self {
            event_type,
            stage: None,
            content: None,
            duration: None,
            timestamp: Utc::now(),
            research_id: research_id.to_string(),
            model,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}
