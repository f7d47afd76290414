//! OpenAI chat completions provider.
//!
//! Also works with any endpoint that speaks the `/chat/completions`
//! function-calling protocol (Azure-style gateways, vLLM, OpenRouter).
//! Tool-call arguments travel as JSON-encoded strings in both directions.

use async_trait::async_trait;
use mcpagent_core::error::ProviderError;
use mcpagent_core::message::{Message, Role, ToolCall};
use mcpagent_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a new provider against a chat completions base URL.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http::build_client()?,
            timeout: Duration::from_secs(120),
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", DEFAULT_BASE_URL, api_key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn to_api_messages(system: Option<&str>, messages: &[Message]) -> Vec<ApiMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            result.push(ApiMessage {
                role: "system".into(),
                content: Some(system.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };

            // Assistant turns that only call tools carry null content
            let content = if m.role == Role::Assistant && m.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(m.content.clone())
            };

            result.push(ApiMessage {
                role: role.into(),
                content,
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
            });
        }
        result
    }

    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn response_to_turn(resp: ApiResponse) -> Result<ProviderTurn, ProviderError> {
        let choice = resp.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("chat completion had no choices".into())
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = decode_arguments(&tc.function.name, &tc.function.arguments)?;
                Ok(ToolCall::new(tc.id, tc.function.name, arguments))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let mut turn = ProviderTurn::tool_calls(tool_calls)
            .with_text(choice.message.content.unwrap_or_default())
            .with_model(resp.model);
        if let Some(usage) = resp.usage {
            turn = turn.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }
        Ok(turn)
    }
}

/// Decode a tool call's argument string. An empty string means no arguments.
fn decode_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        ProviderError::MalformedResponse(format!("arguments for tool '{tool}' are not valid JSON: {e}"))
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn converse(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.messages),
            "max_tokens": request.max_tokens,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;

        let response = http::check_status(&self.name, response).await?;
        let api_resp: ApiResponse = http::read_json(&self.name, response, self.timeout).await?;
        Self::response_to_turn(api_resp)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        http::check_status(&self.name, response).await?;
        Ok(true)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
