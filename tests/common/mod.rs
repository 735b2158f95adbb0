//! Shared test helpers.

#![allow(dead_code)]

pub mod mocks;

use deepbench::{
    AppState, DeepbenchConfig, DeepbenchConfigManager, ResearchStore,
    db::DatabaseProvider,
    llm::LLMClient,
    research::{PipelineConfig, RetryPolicy},
};
use mocks::MockLLMFactory;
use std::sync::Arc;

/// Pipeline settings with millisecond backoff so retry tests stay fast.
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        ..Default::default()
    }
}

pub fn test_config(pipeline: PipelineConfig) -> DeepbenchConfig {
    DeepbenchConfig {
        pipeline,
        ..Default::default()
    }
}

pub async fn memory_store() -> Arc<dyn ResearchStore> {
    DatabaseProvider::Memory
        .create_store()
        .await
        .expect("in-memory store")
}

/// App state over an in-memory store whose factory always hands out `client`.
pub async fn test_state(
    client: Arc<dyn LLMClient>,
    config: DeepbenchConfig,
) -> (AppState, Arc<MockLLMFactory>) {
    let factory = Arc::new(MockLLMFactory::new(client));
    let state = AppState::new(
        Arc::new(DeepbenchConfigManager::from_config(config)),
        memory_store().await,
        factory.clone(),
    );
    (state, factory)
}
