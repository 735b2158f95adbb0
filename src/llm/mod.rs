//! LLM provider clients
//!
//! Research stages talk to providers only through the [`LLMClient`] trait.
//! A run's [`ProviderConfig`] selects the adapter:
//! - **openai**: Chat Completions API
//! - **anthropic**: Messages API
//! - **kimi**: Moonshot's Anthropic-compatible Messages endpoint
//!
//! Adapters report failures as [`AppError::Provider`](crate::types::AppError)
//! tagged transient (timeouts, 408, 429, 5xx, connection errors) or permanent
//! (authentication, malformed requests).

/// Core LLM client trait, provider configuration and failure classification.
pub mod client;

pub mod anthropic;
pub mod openai;

pub use client::{
    LLMClient, LLMClientFactory, LLMClientFactoryTrait, LLMResponse, ProviderConfig, TokenUsage,
};
