//! Research orchestration
//!
//! [`ResearchService`] validates a request, binds it to a session, spawns the
//! pipeline and persists whatever result comes back. Persistence happens in
//! the spawned task, so a result is stored even when the caller stops
//! listening halfway through a run.
//!
//! A session is claimed for the whole of a run, from the slot check until
//! the result is stored. A second run on a claimed session is refused with
//! `Conflict` up front instead of racing the first to the store. The closing
//! event is only sent once the result is stored; a store failure closes the
//! stream with `error` instead.

use super::pipeline::{ResearchPipeline, RunSpec, send_terminal};
use crate::db::ResearchStore;
use crate::events::{EventType, ResearchEvent};
use crate::llm::{LLMClient, LLMClientFactoryTrait};
use crate::types::{
    AppError, ComparisonRequest, ModelKind, ResearchRequest, ResearchResult, ResearchSession,
    Result, SessionType, SessionWithResults,
};
use crate::utils::toml_config::DeepbenchConfigManager;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// A validated run, ready to be bound to a session.
struct PreparedRun {
    model: ModelKind,
    client: Arc<dyn LLMClient>,
}

/// Exclusive hold on a session while its runs execute. Released on drop.
struct SessionClaim {
    session_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.session_id);
    }
}

#[derive(Clone)]
pub struct ResearchService {
    store: Arc<dyn ResearchStore>,
    factory: Arc<dyn LLMClientFactoryTrait>,
    config: Arc<DeepbenchConfigManager>,
    shutdown: CancellationToken,
    active_sessions: Arc<Mutex<HashSet<String>>>,
}

impl ResearchService {
    pub fn new(
        store: Arc<dyn ResearchStore>,
        factory: Arc<dyn LLMClientFactoryTrait>,
        config: Arc<DeepbenchConfigManager>,
    ) -> Self {
        Self {
            store,
            factory,
            config,
            shutdown: CancellationToken::new(),
            active_sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Cancelling this token cancels every run started by the service.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn store(&self) -> &Arc<dyn ResearchStore> {
        &self.store
    }

    // ============== Runs ==============

    /// Start a single run and stream its events.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn stream(&self, request: ResearchRequest) -> Result<ReceiverStream<ResearchEvent>> {
        let query = validate_query(&request.query)?;
        let run = self.prepare(&request.model, &request.api_key).await?;
        let session_type = request.session_type.unwrap_or_default();
        let claim = self.claim(request.session_id)?;
        let session = self
            .open_session(&claim, &query, session_type, &[run.model])
            .await?;

        let (tx, rx) = self.channel();
        let service = self.clone();
        tokio::spawn(async move {
            let _claim = claim;
            let _ = service.execute(&session, run, &tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Run the same query against several models, one after another, on a
    /// single concatenated event stream.
    #[instrument(skip(self, request), fields(runs = request.runs.len()))]
    pub async fn compare_stream(
        &self,
        request: ComparisonRequest,
    ) -> Result<ReceiverStream<ResearchEvent>> {
        let query = validate_query(&request.query)?;
        if request.runs.is_empty() {
            return Err(AppError::InvalidInput(
                "A comparison needs at least one model run".to_string(),
            ));
        }

        let mut runs = Vec::with_capacity(request.runs.len());
        let mut seen = HashSet::new();
        for model_run in &request.runs {
            let run = self.prepare(&model_run.model, &model_run.api_key).await?;
            if !seen.insert(run.model) {
                return Err(AppError::InvalidInput(format!(
                    "Model {} appears more than once in the comparison",
                    run.model
                )));
            }
            runs.push(run);
        }

        let models: Vec<ModelKind> = runs.iter().map(|r| r.model).collect();
        let claim = self.claim(request.session_id)?;
        let session = self
            .open_session(&claim, &query, SessionType::Comparison, &models)
            .await?;

        let (tx, rx) = self.channel();
        let service = self.clone();
        tokio::spawn(async move {
            let _claim = claim;
            // A departed consumer makes each remaining run fail fast as
            // cancelled, so every model still gets a persisted result.
            for run in runs {
                let _ = service.execute(&session, run, &tx).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Run to completion without streaming and return the stored result.
    ///
    /// Fails when the result could not be stored.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn run(&self, request: ResearchRequest) -> Result<ResearchResult> {
        let query = validate_query(&request.query)?;
        let run = self.prepare(&request.model, &request.api_key).await?;
        let session_type = request.session_type.unwrap_or_default();
        let claim = self.claim(request.session_id)?;
        let session = self
            .open_session(&claim, &query, session_type, &[run.model])
            .await?;

        let (tx, mut rx) = self.channel();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let _claim = claim;
            service.execute(&session, run, &tx).await
        });

        while rx.recv().await.is_some() {}

        handle
            .await
            .map_err(|e| AppError::Internal(format!("research task failed: {}", e)))?
    }

    fn channel(&self) -> (mpsc::Sender<ResearchEvent>, mpsc::Receiver<ResearchEvent>) {
        mpsc::channel(self.config.config().pipeline.event_buffer.max(1))
    }

    async fn prepare(&self, model: &str, api_key: &str) -> Result<PreparedRun> {
        let model: ModelKind = model.parse()?;
        if api_key.trim().is_empty() {
            return Err(AppError::InvalidInput(format!(
                "An API key is required for {}",
                model
            )));
        }

        let provider_config = self.config.config().provider_config(model, api_key.trim());
        let client = self.factory.create(&provider_config).await?;
        Ok(PreparedRun { model, client })
    }

    /// Take the session for one request, minting an id when none was given.
    fn claim(&self, session_id: Option<String>) -> Result<SessionClaim> {
        let session_id = match session_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if !self.active_sessions.lock().insert(session_id.clone()) {
            return Err(AppError::Conflict(format!(
                "Session {} already has a research run in progress",
                session_id
            )));
        }
        Ok(SessionClaim {
            session_id,
            active: self.active_sessions.clone(),
        })
    }

    /// Create (or confirm) the claimed session and make sure each model still
    /// has a free result slot in it.
    async fn open_session(
        &self,
        claim: &SessionClaim,
        query: &str,
        session_type: SessionType,
        models: &[ModelKind],
    ) -> Result<ResearchSession> {
        let session_id = claim.session_id.as_str();

        let session = self
            .store
            .create_session(session_id, query, session_type)
            .await?;

        let existing = self.store.results_for_session(session_id).await?;
        match session_type {
            SessionType::Individual if !existing.is_empty() => {
                return Err(AppError::Conflict(format!(
                    "Individual session {} already has a result",
                    session_id
                )));
            }
            _ => {}
        }
        if let Some(taken) = existing.iter().find(|r| models.contains(&r.model)) {
            return Err(AppError::Conflict(format!(
                "Session {} already has a result for {}",
                session_id, taken.model
            )));
        }

        Ok(session)
    }

    /// Execute one run and persist its result before its closing event is
    /// sent, so a consumer that sees `research_complete` can query it.
    async fn execute(
        &self,
        session: &ResearchSession,
        run: PreparedRun,
        events: &mpsc::Sender<ResearchEvent>,
    ) -> Result<ResearchResult> {
        let pipeline_config = self.config.config().pipeline.clone();
        let pipeline = ResearchPipeline::new(run.client, pipeline_config);
        let spec = RunSpec {
            research_id: Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            query: session.query.clone(),
            model: run.model,
        };

        let cancel = self.shutdown.child_token();
        let outcome = pipeline.execute_held(&spec, events, &cancel).await;
        let result = outcome.result;

        match self.store.insert_result(&result).await {
            Ok(()) => {
                info!(
                    research_id = %result.research_id,
                    session_id = %result.session_id,
                    success = result.success,
                    "Persisted research result"
                );
                send_terminal(events, outcome.terminal).await;
                Ok(result)
            }
            Err(e) => {
                error!(
                    research_id = %result.research_id,
                    session_id = %result.session_id,
                    "Failed to persist research result: {}",
                    e
                );
                let mut failure = outcome
                    .terminal
                    .with_content(format!("Research result was not stored: {}", e));
                failure.event_type = EventType::Error;
                send_terminal(events, failure).await;
                Err(e)
            }
        }
    }

    // ============== Sessions ==============

    pub async fn session(&self, session_id: &str) -> Result<SessionWithResults> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
        let results = self.store.results_for_session(session_id).await?;
        Ok(SessionWithResults { session, results })
    }

    pub async fn sessions(&self, limit: u32) -> Result<Vec<SessionWithResults>> {
        self.store.list_sessions(limit).await
    }

    pub async fn record_feedback(
        &self,
        session_id: &str,
        feedback: &serde_json::Value,
    ) -> Result<ResearchSession> {
        self.store.update_feedback(session_id, feedback).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self.store.delete_session(session_id).await?;
        info!(session_id, deleted, "Delete session requested");
        Ok(deleted)
    }
}

fn validate_query(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("Query must not be empty".to_string()));
    }
    Ok(query.to_string())
}
