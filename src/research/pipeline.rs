//! Research pipeline engine
//!
//! Drives one run through the [`Stage`] machine, pushing [`ResearchEvent`]s
//! into a bounded channel as it goes and always finishing with exactly one
//! [`ResearchResult`], whether the run completed or failed.
//!
//! Every provider call is raced against three things: the run's wall-clock
//! deadline, the run's [`CancellationToken`], and the event consumer going
//! away. Whichever fires first aborts the in-flight call by dropping it.

use super::metrics;
use super::prompts;
use super::retry::RetryPolicy;
use super::stage::{Stage, StageMachine};
use crate::events::{EventType, ResearchEvent};
use crate::llm::LLMClient;
use crate::types::{AppError, ModelKind, ResearchResult, Result, StageTimings};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long a terminal event may wait on a full channel.
const TERMINAL_SEND_GRACE: Duration = Duration::from_secs(5);

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub allow_clarification: bool,
    #[serde(default = "default_max_research_iterations")]
    pub max_research_iterations: u32,
    #[serde(default = "default_max_findings")]
    pub max_findings: usize,
    /// Wall-clock budget for a whole run
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,
    /// Idle threshold before the SSE transport writes a keep-alive comment
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Capacity of the per-run event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_research_iterations() -> u32 {
    5
}

fn default_max_findings() -> usize {
    10
}

fn default_run_budget_secs() -> u64 {
    900
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_event_buffer() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allow_clarification: false,
            max_research_iterations: default_max_research_iterations(),
            max_findings: default_max_findings(),
            run_budget_secs: default_run_budget_secs(),
            keepalive_secs: default_keepalive_secs(),
            event_buffer: default_event_buffer(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

/// Identity and input of one run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub research_id: String,
    pub session_id: String,
    pub query: String,
    pub model: ModelKind,
}

/// Handle to a spawned run.
///
/// Dropping `events` cancels the run; the result is still produced.
pub struct PipelineRun {
    pub events: ReceiverStream<ResearchEvent>,
    pub result: JoinHandle<ResearchResult>,
    pub cancel: CancellationToken,
}

/// A finished run whose closing event has not been sent yet.
pub struct RunOutcome {
    pub result: ResearchResult,
    /// `research_complete` or `error`
    pub terminal: ResearchEvent,
}

/// Executes research runs against one provider client.
pub struct ResearchPipeline {
    client: Arc<dyn LLMClient>,
    config: PipelineConfig,
}

/// Mutable progress of one run, kept so a failure can still report what
/// was gathered before it.
#[derive(Default)]
struct Progress {
    stage_timings: StageTimings,
    tools_used: Vec<String>,
    brief: Option<String>,
    findings: Vec<String>,
    notes: Vec<String>,
    report: String,
}

impl Progress {
    fn record_tool(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }
}

/// Per-run plumbing shared by every stage.
struct RunContext<'a> {
    spec: &'a RunSpec,
    events: &'a mpsc::Sender<ResearchEvent>,
    cancel: &'a CancellationToken,
    deadline: Instant,
    budget: Duration,
    retry: &'a RetryPolicy,
}

impl RunContext<'_> {
    fn event(&self, event_type: EventType) -> ResearchEvent {
        ResearchEvent::new(event_type, &self.spec.research_id, self.spec.model)
    }

    /// Race `fut` against cancellation, consumer disconnect and the deadline.
    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(AppError::Cancelled("research run was cancelled".to_string()))
            }
            _ = self.events.closed() => {
                Err(AppError::Cancelled("event consumer disconnected".to_string()))
            }
            outcome = tokio::time::timeout_at(self.deadline, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(format!(
                    "research exceeded its {}s budget",
                    self.budget.as_secs()
                ))),
            },
        }
    }

    async fn emit(&self, event: ResearchEvent) -> Result<()> {
        self.guard(async {
            self.events
                .send(event)
                .await
                .map_err(|_| AppError::Cancelled("event consumer disconnected".to_string()))
        })
        .await
    }

    /// One provider call with transient-failure retry.
    async fn call<T, F, Fut>(&self, stage: Stage, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let spec = self.spec;
        self.guard(self.retry.run(op, |attempt, err, delay| {
            warn!(
                research_id = %spec.research_id,
                model = %spec.model,
                stage = %stage,
                "Transient provider failure (attempt {}): {}; retrying in {:?}",
                attempt,
                err,
                delay
            );
        }))
        .await
    }
}

impl ResearchPipeline {
    pub fn new(client: Arc<dyn LLMClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the run on the runtime and hand back its event stream.
    pub fn spawn(self: Arc<Self>, spec: RunSpec) -> PipelineRun {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let result = tokio::spawn(async move { self.execute(&spec, &tx, &token).await });

        PipelineRun {
            events: ReceiverStream::new(rx),
            result,
            cancel,
        }
    }

    /// Run to a terminal state, streaming events into `events`.
    ///
    /// Never fails: any error becomes a `success = false` result.
    pub async fn execute(
        &self,
        spec: &RunSpec,
        events: &mpsc::Sender<ResearchEvent>,
        cancel: &CancellationToken,
    ) -> ResearchResult {
        let outcome = self.execute_held(spec, events, cancel).await;
        send_terminal(events, outcome.terminal).await;
        outcome.result
    }

    /// Like [`execute`](Self::execute), but hands the closing event back
    /// instead of sending it, so the caller can store the result first.
    #[instrument(skip(self, spec, events, cancel), fields(research_id = %spec.research_id, model = %spec.model))]
    pub async fn execute_held(
        &self,
        spec: &RunSpec,
        events: &mpsc::Sender<ResearchEvent>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let started = Instant::now();
        let budget = self.config.run_budget();
        let ctx = RunContext {
            spec,
            events,
            cancel,
            deadline: started + budget,
            budget,
            retry: &self.config.retry,
        };
        let mut machine = StageMachine::new();
        let mut progress = Progress::default();

        info!("Starting research run");
        let outcome = self.drive(&ctx, &mut machine, &mut progress).await;
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                let sources_found = metrics::count_sources(&progress.report);
                let word_count = metrics::count_words(&progress.report);
                info!(
                    duration,
                    sources_found, word_count, "Research run completed"
                );
                let terminal = ctx
                    .event(EventType::ResearchComplete)
                    .with_stage(Stage::Complete)
                    .with_content(progress.report.clone())
                    .with_duration(duration);

                let result = ResearchResult {
                    research_id: spec.research_id.clone(),
                    session_id: spec.session_id.clone(),
                    model: spec.model,
                    duration,
                    stage_timings: progress.stage_timings,
                    sources_found,
                    word_count,
                    success: true,
                    error: None,
                    report_content: progress.report,
                    supervisor_tools_used: progress.tools_used,
                    research_brief: progress.brief,
                    created_at: Utc::now(),
                };
                RunOutcome { result, terminal }
            }
            Err(err) => {
                let failed_stage = machine.current();
                if let Err(e) = machine.advance(Stage::Failed) {
                    warn!("{}", e);
                }
                warn!(stage = %failed_stage, duration, "Research run failed: {}", err);

                let message = err.to_string();
                let terminal = ctx
                    .event(EventType::Error)
                    .with_stage(failed_stage)
                    .with_content(message.clone())
                    .with_duration(duration);

                let result = ResearchResult {
                    research_id: spec.research_id.clone(),
                    session_id: spec.session_id.clone(),
                    model: spec.model,
                    duration,
                    stage_timings: progress.stage_timings,
                    sources_found: 0,
                    word_count: 0,
                    success: false,
                    error: Some(message),
                    report_content: String::new(),
                    supervisor_tools_used: progress.tools_used,
                    research_brief: progress.brief,
                    created_at: Utc::now(),
                };
                RunOutcome { result, terminal }
            }
        }
    }

    async fn drive(
        &self,
        ctx: &RunContext<'_>,
        machine: &mut StageMachine,
        progress: &mut Progress,
    ) -> Result<()> {
        ctx.emit(
            ctx.event(EventType::SessionStart)
                .with_stage(Stage::Initialized)
                .with_content(format!("Starting research with {}", ctx.spec.model)),
        )
        .await?;

        for stage in Stage::plan(self.config.allow_clarification) {
            machine
                .advance(stage)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            ctx.emit(
                ctx.event(EventType::StageStart)
                    .with_stage(stage)
                    .with_content(stage_label(stage)),
            )
            .await?;

            let stage_started = Instant::now();
            match stage {
                Stage::Clarification => self.clarify(ctx).await?,
                Stage::Brief => self.write_brief(ctx, progress).await?,
                Stage::Execution => self.supervise(ctx, progress).await?,
                Stage::Report => self.write_report(ctx, progress).await?,
                _ => {}
            }
            let elapsed = stage_started.elapsed().as_secs_f64();
            progress
                .stage_timings
                .insert(stage.as_str().to_string(), elapsed);
            debug!(stage = %stage, elapsed, "Stage finished");

            ctx.emit(
                ctx.event(EventType::ResearchStep)
                    .with_stage(stage)
                    .with_content(format!("{} finished", stage_label(stage)))
                    .with_duration(elapsed),
            )
            .await?;
        }

        machine
            .advance(Stage::Complete)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn clarify(&self, ctx: &RunContext<'_>) -> Result<()> {
        let client = &self.client;
        let prompt = prompts::clarify_prompt(&ctx.spec.query);
        let prompt = prompt.as_str();
        let response = ctx
            .call(Stage::Clarification, move || {
                client.generate_with_system(prompts::CLARIFY_SYSTEM, prompt)
            })
            .await?;

        if !response.content.trim().is_empty() {
            ctx.emit(
                ctx.event(EventType::StageUpdate)
                    .with_stage(Stage::Clarification)
                    .with_content(response.content),
            )
            .await?;
        }
        Ok(())
    }

    async fn write_brief(&self, ctx: &RunContext<'_>, progress: &mut Progress) -> Result<()> {
        let client = &self.client;
        let prompt = prompts::brief_prompt(&ctx.spec.query);
        let prompt = prompt.as_str();
        let response = ctx
            .call(Stage::Brief, move || {
                client.generate_with_system(prompts::BRIEF_SYSTEM, prompt)
            })
            .await?;

        let brief = if response.content.trim().is_empty() {
            ctx.spec.query.clone()
        } else {
            response.content
        };
        progress.brief = Some(brief.clone());
        ctx.emit(
            ctx.event(EventType::StageUpdate)
                .with_stage(Stage::Brief)
                .with_content(brief),
        )
        .await
    }

    /// Supervisor loop: delegate sub-research until the supervisor signals
    /// completion, stops calling tools, or the iteration budget runs out.
    async fn supervise(&self, ctx: &RunContext<'_>, progress: &mut Progress) -> Result<()> {
        let client = &self.client;
        let tools = prompts::supervisor_tools();
        let tools = tools.as_slice();
        let brief = progress
            .brief
            .clone()
            .unwrap_or_else(|| ctx.spec.query.clone());

        for iteration in 0..self.config.max_research_iterations {
            debug!(
                "Supervisor iteration {}/{}",
                iteration + 1,
                self.config.max_research_iterations
            );
            let prompt = prompts::supervisor_prompt(&brief, &progress.findings, &progress.notes);
            let prompt = prompt.as_str();
            let response = ctx
                .call(Stage::Execution, move || {
                    client.generate_with_tools(prompts::SUPERVISOR_SYSTEM, prompt, tools)
                })
                .await?;

            if response.tool_calls.is_empty() {
                if !response.content.trim().is_empty() {
                    ctx.emit(
                        ctx.event(EventType::StageUpdate)
                            .with_stage(Stage::Execution)
                            .with_content(response.content),
                    )
                    .await?;
                }
                break;
            }

            let mut complete = false;
            for call in response.tool_calls {
                progress.record_tool(&call.name);
                match call.name.as_str() {
                    prompts::CONDUCT_RESEARCH => {
                        if progress.findings.len() >= self.config.max_findings {
                            debug!("Finding limit reached, skipping delegated research");
                            continue;
                        }
                        let topic = call
                            .arguments
                            .get("research_topic")
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| call.arguments.to_string());
                        ctx.emit(
                            ctx.event(EventType::StageUpdate)
                                .with_stage(Stage::Execution)
                                .with_content(format!("Researching: {}", topic)),
                        )
                        .await?;

                        let researcher_prompt = prompts::researcher_prompt(&topic);
                        let researcher_prompt = researcher_prompt.as_str();
                        let finding = ctx
                            .call(Stage::Execution, move || {
                                client
                                    .generate_with_system(prompts::RESEARCHER_SYSTEM, researcher_prompt)
                            })
                            .await?;
                        ctx.emit(
                            ctx.event(EventType::ResearchFinding)
                                .with_stage(Stage::Execution)
                                .with_content(finding.content.clone()),
                        )
                        .await?;
                        progress.findings.push(finding.content);
                    }
                    prompts::THINK => {
                        let reflection = call
                            .arguments
                            .get("reflection")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        if !reflection.is_empty() {
                            ctx.emit(
                                ctx.event(EventType::StageUpdate)
                                    .with_stage(Stage::Execution)
                                    .with_content(reflection.clone()),
                            )
                            .await?;
                            progress.notes.push(reflection);
                        }
                    }
                    prompts::RESEARCH_COMPLETE => complete = true,
                    other => warn!("Supervisor requested unknown tool '{}'", other),
                }
            }

            if complete {
                break;
            }
        }
        Ok(())
    }

    async fn write_report(&self, ctx: &RunContext<'_>, progress: &mut Progress) -> Result<()> {
        let client = &self.client;
        let brief = progress.brief.as_deref().unwrap_or(&ctx.spec.query);
        let prompt = prompts::report_prompt(&ctx.spec.query, brief, &progress.findings);
        let prompt = prompt.as_str();
        let response = ctx
            .call(Stage::Report, move || {
                client.generate_with_system(prompts::REPORT_SYSTEM, prompt)
            })
            .await?;

        if response.content.trim().is_empty() {
            return Err(AppError::permanent("provider returned an empty report"));
        }
        ctx.emit(
            ctx.event(EventType::StageUpdate)
                .with_stage(Stage::Report)
                .with_content(format!(
                    "Report written ({} words)",
                    metrics::count_words(&response.content)
                )),
        )
        .await?;
        progress.report = response.content;
        Ok(())
    }
}

/// Deliver the closing event outside the run's deadline. A consumer that is
/// gone or stalled past the grace period simply misses it.
pub(crate) async fn send_terminal(events: &mpsc::Sender<ResearchEvent>, event: ResearchEvent) {
    if events.is_closed() {
        return;
    }
    if tokio::time::timeout(TERMINAL_SEND_GRACE, events.send(event))
        .await
        .is_err()
    {
        warn!("Consumer stalled; terminal event dropped");
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Initialized => "Initialization",
        Stage::Clarification => "Clarification",
        Stage::Brief => "Research brief",
        Stage::Execution => "Research execution",
        Stage::Report => "Final report",
        Stage::Complete => "Complete",
        Stage::Failed => "Failed",
    }
}
