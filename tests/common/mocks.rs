//! Mock implementations for testing.
//!
//! [`ScriptedLLMClient`] answers each research stage by its system prompt, so
//! a whole run can execute without network access. Failures and hangs can be
//! queued per stage.

use async_trait::async_trait;
use deepbench::llm::{LLMClient, LLMClientFactoryTrait, LLMResponse, ProviderConfig};
use deepbench::research::prompts;
use deepbench::types::{AppError, Result, ToolCall, ToolDefinition};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A queued misbehaviour for calls made with a given system prompt.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Transient,
    Permanent,
    /// Never returns
    Hang,
    /// Answers normally after this many milliseconds
    Delay(u64),
}

pub struct ScriptedLLMClient {
    pub brief: String,
    pub finding: String,
    pub report: String,
    /// How many supervisor rounds delegate research before signalling completion
    pub research_rounds: usize,
    faults: Mutex<Vec<(&'static str, VecDeque<Fault>)>>,
    supervisor_calls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedLLMClient {
    pub fn new(report: &str) -> Self {
        Self {
            brief: "Investigate the question thoroughly.".to_string(),
            finding: "Relevant facts with a source https://example.com/finding".to_string(),
            report: report.to_string(),
            research_rounds: 1,
            faults: Mutex::new(Vec::new()),
            supervisor_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A report with `sources` distinct URLs and exactly `words` words.
    pub fn with_report_shape(sources: usize, words: usize) -> Self {
        Self::new(&report_text(sources, words))
    }

    pub fn rounds(mut self, rounds: usize) -> Self {
        self.research_rounds = rounds;
        self
    }

    /// Queue `faults` for calls using `system`; each call consumes one.
    pub fn fault(self, system: &'static str, faults: &[Fault]) -> Self {
        self.faults
            .lock()
            .push((system, faults.iter().copied().collect()));
        self
    }

    /// System prompts of every call made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, system: &str) -> usize {
        self.calls.lock().iter().filter(|s| **s == system).count()
    }

    async fn before_call(&self, system: &str) -> Result<()> {
        let label = stage_of(system);
        self.calls.lock().push(label);

        let fault = {
            let mut faults = self.faults.lock();
            faults
                .iter_mut()
                .find(|(s, _)| *s == label)
                .and_then(|(_, queue)| queue.pop_front())
        };
        match fault {
            None => Ok(()),
            Some(Fault::Transient) => Err(AppError::transient("Anthropic API returned 529: overloaded")),
            Some(Fault::Permanent) => Err(AppError::permanent("Anthropic API returned 401: invalid x-api-key")),
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Delay(ms)) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn generate_with_system(&self, system: &str, _prompt: &str) -> Result<LLMResponse> {
        self.before_call(system).await?;
        let content = match stage_of(system) {
            s if s == prompts::BRIEF_SYSTEM => self.brief.clone(),
            s if s == prompts::RESEARCHER_SYSTEM => self.finding.clone(),
            s if s == prompts::REPORT_SYSTEM => self.report.clone(),
            _ => "No clarification needed.".to_string(),
        };
        Ok(LLMResponse::text(content))
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        _prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.before_call(system).await?;
        let round = self.supervisor_calls.fetch_add(1, Ordering::SeqCst);
        let call = if round < self.research_rounds {
            ToolCall {
                id: format!("call-{}", round),
                name: prompts::CONDUCT_RESEARCH.to_string(),
                arguments: serde_json::json!({ "research_topic": format!("subtopic {}", round + 1) }),
            }
        } else {
            ToolCall {
                id: format!("call-{}", round),
                name: prompts::RESEARCH_COMPLETE.to_string(),
                arguments: serde_json::json!({}),
            }
        };
        Ok(LLMResponse {
            content: String::new(),
            tool_calls: vec![call],
            finish_reason: "tool_calls".to_string(),
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Map a system prompt onto its `'static` constant so calls can be recorded.
fn stage_of(system: &str) -> &'static str {
    [
        prompts::CLARIFY_SYSTEM,
        prompts::BRIEF_SYSTEM,
        prompts::SUPERVISOR_SYSTEM,
        prompts::RESEARCHER_SYSTEM,
        prompts::REPORT_SYSTEM,
    ]
    .into_iter()
    .find(|p| *p == system)
    .unwrap_or("unknown")
}

/// Build report text with `sources` distinct URLs and `words` words in total.
pub fn report_text(sources: usize, words: usize) -> String {
    assert!(words >= sources);
    let mut tokens: Vec<String> = (0..sources)
        .map(|i| format!("https://source{}.example.org/page", i))
        .collect();
    tokens.extend((sources..words).map(|i| format!("word{}", i)));
    tokens.join(" ")
}

/// Factory that always returns the same client and records every config.
pub struct MockLLMFactory {
    client: Arc<dyn LLMClient>,
    seen: Mutex<Vec<ProviderConfig>>,
}

impl MockLLMFactory {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn configs(&self) -> Vec<ProviderConfig> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl LLMClientFactoryTrait for MockLLMFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LLMClient>> {
        self.seen.lock().push(config.clone());
        Ok(self.client.clone())
    }
}
