//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable language model gateways
//! - [`ProviderRegistry`] for creating a client from configuration
//! - [`OpenAiClient`]: OpenAI-compatible chat completions, including Azure deployments
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient`
//! 3. Add it to `ProviderRegistry::create()`

mod types;

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use openai::OpenAiClient;

use super::message::{ChatMessage, ToolCallRequest};

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the model, in order.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Create a response that only requests tool calls.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// Non-empty text content, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait - the language model gateway.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt sequence with tool schemas and get the model's reply.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Plain single-prompt completion, used for routing decisions.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.chat(&[ChatMessage::user(prompt)], &[]).await?;
        response
            .content
            .ok_or_else(|| Error::Llm("completion returned no text".to_string()))
    }

    /// Get the model this client talks to.
    fn default_model(&self) -> &str;
}

/// Provider registry - creates LLM clients from configuration.
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client from configuration.
    ///
    /// Supported providers:
    /// - `"openai"`: OpenAI-compatible API with bearer key
    /// - `"azure"`: Azure OpenAI deployment (`model` is the deployment name)
    pub fn create(config: &Config) -> Result<Arc<dyn LlmClient>> {
        if config.api_key.is_empty() {
            return Err(Error::Config(format!(
                "No API key configured (set api_key or {})",
                crate::config::API_KEY_ENV
            )));
        }

        match config.provider.as_str() {
            "openai" => Ok(Arc::new(OpenAiClient::new(
                &config.api_key,
                &config.base_url,
                &config.model,
            )?)),
            "azure" => Ok(Arc::new(OpenAiClient::azure(
                &config.api_key,
                &config.base_url,
                &config.model,
                &config.api_version,
            )?)),
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["openai", "azure"]
    }
}

/// Scripted LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResponse>>,
    repeat: Option<LlmResponse>,
    requests: std::sync::Mutex<Vec<Vec<ChatMessage>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.iter().map(|s| LlmResponse::text(*s)).collect())
    }

    /// Create with arbitrary responses, served in order.
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            repeat: None,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        Self::scripted(vec![
            LlmResponse::tool_calls(vec![ToolCallRequest::new("call_1", name, args.to_string())]),
            LlmResponse::text(final_response),
        ])
    }

    /// Answer every request with the same response.
    pub fn always(response: LlmResponse) -> Self {
        Self {
            responses: std::sync::Mutex::new(Default::default()),
            repeat: Some(response),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Prompt sequences received, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::Llm("No more fake responses".to_string()))
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
