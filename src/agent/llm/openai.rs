//! OpenAI-compatible chat completions client (OpenAI and Azure OpenAI).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{ChatMessage, Role, ToolCallRequest};
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, WireFunctionCall, WireMessage, WireTool,
    WireToolCall, WireToolFunction,
};
use super::{LlmClient, LlmResponse, Usage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
enum Auth {
    Bearer,
    AzureKey,
}

/// Chat completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    url: String,
    model: String,
    auth: Auth,
    client: Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    /// Client for the OpenAI API (or any compatible base URL).
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            auth: Auth::Bearer,
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    /// Client for an Azure OpenAI deployment.
    pub fn azure(api_key: &str, endpoint: &str, deployment: &str, api_version: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            model: deployment.to_string(),
            auth: Auth::AzureKey,
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Auth::Bearer => request.bearer_auth(&self.api_key),
            Auth::AzureKey => request.header("api-key", &self.api_key),
        }
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            kind: "function".to_string(),
                            function: WireFunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect::<Vec<_>>()
                });

                // Assistant tool-call turns carry no text
                let content = if tool_calls.is_some() && m.content.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                };

                WireMessage {
                    role: m.role.as_str().to_string(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<WireTool>> {
        if tools.is_empty() {
            return None;
        }

        Some(
            tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    fn parse_response(response: ChatCompletionResponse) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in response".to_string()))?;

        if choice.message.role != Role::Assistant.as_str() {
            debug!("Unexpected response role: {}", choice.message.role);
        }

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: match self.auth {
                Auth::Bearer => Some(self.model.as_str()),
                Auth::AzureKey => None,
            },
            messages: Self::convert_messages(messages),
            tools: Self::convert_tools(tools),
            temperature: 0.0,
        };

        debug!("LLM request: {} messages, {} tools", messages.len(), tools.len());

        let response = self
            .authorize(self.client.post(&self.url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("API error {status}: {error_text}")));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let parsed = Self::parse_response(completion)?;

        debug!(
            "LLM response: finish={}, {} tool calls, {} tokens",
            parsed.finish_reason,
            parsed.tool_calls.len(),
            parsed.usage.total_tokens
        );
        Ok(parsed)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
