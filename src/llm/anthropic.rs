//! Anthropic Messages API client
//!
//! Also serves Kimi, whose Moonshot endpoint speaks the same wire format;
//! only the base URL and model identifier differ.

use crate::llm::client::{
    LLMClient, LLMResponse, ProviderConfig, TokenUsage, body_error, http_client,
    status_error, transport_error,
};
use crate::types::{ModelKind, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude client for API-based inference
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    provider: &'static str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider = match config.model {
            ModelKind::Kimi => "Kimi",
            _ => "Anthropic",
        };
        Ok(Self {
            http: http_client(config)?,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/messages", config.api_base.trim_end_matches('/')),
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            provider,
        })
    }

    fn convert_tool(tool: &ToolDefinition) -> Tool<'_> {
        Tool {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.parameters,
        }
    }

    /// Extract text content from response content blocks
    fn extract_text_content(content: &[ContentBlock]) -> String {
        content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from response content blocks
    fn extract_tool_calls(content: &[ContentBlock]) -> Vec<ToolCall> {
        content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<LLMResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(self.provider, status, &body));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| body_error(self.provider, e))?;

        Ok(LLMResponse {
            content: Self::extract_text_content(&body.content),
            tool_calls: Self::extract_tool_calls(&body.content),
            finish_reason: body.stop_reason.unwrap_or_else(|| "stop".to_string()),
            usage: body.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        })
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<LLMResponse> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            tools: Vec::new(),
        };
        self.send(&request).await
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            tools: tools.iter().map(Self::convert_tool).collect(),
        };
        self.send(&request).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
