//! Deep-research runs
//!
//! A run takes a query through a fixed sequence of stages (brief, supervised
//! research, final report) against one provider, streaming progress events
//! and ending in exactly one [`ResearchResult`](crate::types::ResearchResult).
//!
//! - [`stage`]: the closed stage enum and its transition table
//! - [`pipeline`]: executes one run
//! - [`service`]: validation, sessions, comparisons and persistence
//! - [`retry`]: backoff for transient provider failures
//! - [`metrics`]: source and word counting over report text
//! - [`prompts`]: system prompts and supervisor tool definitions

pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod service;
pub mod stage;

pub use pipeline::{PipelineConfig, PipelineRun, ResearchPipeline, RunOutcome, RunSpec};
pub use retry::RetryPolicy;
pub use service::ResearchService;
pub use stage::{Stage, StageMachine};
