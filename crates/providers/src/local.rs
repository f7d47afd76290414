//! Local model provider — talks to an Ollama server on a host/port.
//!
//! Differences from the hosted adapters:
//! - no credential, just a base URL (`OLLAMA_HOST` / `OLLAMA_PORT`)
//! - tool calls arrive without ids, so ids are assigned here
//! - the first call after startup gets an extra allowance on top of the
//!   per-call timeout while the server loads the model into memory

use async_trait::async_trait;
use mcpagent_core::error::ProviderError;
use mcpagent_core::message::{Message, Role, ToolCall};
use mcpagent_core::provider::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::http;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct LocalProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    warmup_allowance: Duration,
    warmed_up: AtomicBool,
}

impl LocalProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client()?,
            timeout: Duration::from_secs(120),
            warmup_allowance: Duration::from_secs(120),
            warmed_up: AtomicBool::new(false),
        })
    }

    /// Ollama on its default port.
    pub fn localhost() -> Result<Self, ProviderError> {
        Self::new(DEFAULT_BASE_URL)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_warmup_allowance(mut self, allowance: Duration) -> Self {
        self.warmup_allowance = allowance;
        self
    }

    /// Timeout for the next call.
    fn call_timeout(&self) -> Duration {
        if self.warmed_up.load(Ordering::Acquire) {
            self.timeout
        } else {
            self.timeout + self.warmup_allowance
        }
    }

    fn to_api_messages(system: Option<&str>, messages: &[Message]) -> Vec<OllamaMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            result.push(OllamaMessage::text("system", system));
        }
        for m in messages {
            match m.role {
                Role::User => result.push(OllamaMessage::text("user", &m.content)),
                Role::Assistant => {
                    let mut msg = OllamaMessage::text("assistant", &m.content);
                    msg.tool_calls = m
                        .tool_calls
                        .iter()
                        .map(|tc| OllamaToolCall {
                            function: OllamaFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect();
                    result.push(msg);
                }
                Role::Tool => result.push(OllamaMessage::text("tool", &m.content)),
            }
        }
        result
    }

    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn response_to_turn(resp: OllamaResponse) -> Result<ProviderTurn, ProviderError> {
        let mut tool_calls = Vec::with_capacity(resp.message.tool_calls.len());
        for (i, tc) in resp.message.tool_calls.into_iter().enumerate() {
            let arguments = match tc.function.arguments {
                serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
                serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
                    ProviderError::MalformedResponse(format!(
                        "arguments for tool '{}' are not valid JSON: {e}",
                        tc.function.name
                    ))
                })?,
                serde_json::Value::Null => serde_json::json!({}),
                other => other,
            };
            let id = format!("call_{}_{i}", Uuid::new_v4().simple());
            tool_calls.push(ToolCall::new(id, tc.function.name, arguments));
        }

        let mut turn = ProviderTurn::tool_calls(tool_calls)
            .with_text(resp.message.content)
            .with_model(resp.model);
        if let (Some(prompt), Some(completion)) = (resp.prompt_eval_count, resp.eval_count) {
            turn = turn.with_usage(Usage::new(prompt, completion));
        }
        Ok(turn)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn converse(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let timeout = self.call_timeout();

        let mut options = serde_json::json!({ "num_predict": request.max_tokens });
        if let Some(temperature) = request.temperature {
            options["temperature"] = serde_json::json!(temperature);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.messages),
            "stream": false,
            "options": options,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(
            provider = "ollama",
            model = %request.model,
            timeout_secs = timeout.as_secs(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, timeout))?;

        let response = http::check_status("ollama", response).await?;
        let api_resp: OllamaResponse = http::read_json("ollama", response, timeout).await?;

        if !self.warmed_up.swap(true, Ordering::AcqRel) {
            info!(model = %api_resp.model, "Local model warmed up");
        }
        Self::response_to_turn(api_resp)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        http::check_status("ollama", response).await?;
        Ok(true)
    }
}

// --- Ollama API types ---

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

impl OllamaMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}
