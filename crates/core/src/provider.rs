//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation plus a tool catalog to a
//! model and translate the answer back into a [`ProviderTurn`]. Wire-format
//! differences (role naming, tool-call encoding, id assignment) stay inside
//! the implementation.
//!
//! Implementations: Anthropic Messages API, OpenAI chat completions, local
//! Ollama server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};

/// A tool the model may call, as advertised by the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(default = "unconstrained_schema")]
    pub parameters: serde_json::Value,

    /// Endpoint that serves this tool directly, bypassing the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_endpoint: Option<String>,
}

/// The schema used when a tool advertises none: any object is accepted.
pub fn unconstrained_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: parameters
                .filter(|p| !p.is_null())
                .unwrap_or_else(unconstrained_schema),
            direct_endpoint: None,
        }
    }

    pub fn with_direct_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.direct_endpoint = Some(endpoint.into());
        self
    }
}

/// Everything an adapter needs for one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,

    /// System instructions, sent out-of-band from the history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation so far, oldest first
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One provider response: assistant text and/or requested tool calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderTurn {
    /// Assistant text; `None` when the backend sent none or only whitespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Tool calls in the order the model emitted them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

impl ProviderTurn {
    /// A text-only turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: non_empty(text.into()),
            ..Self::default()
        }
    }

    /// A turn that requests tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    /// Set (or clear) the text, normalizing blank text to `None`.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = non_empty(text.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// A turn without tool calls ends the loop.
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() { None } else { Some(text) }
}

/// The core Provider trait.
///
/// Every backend implements this trait. The agent loop calls `converse()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "ollama").
    fn name(&self) -> &str;

    /// Send the conversation and catalog, get one assistant turn back.
    async fn converse(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_without_schema_is_unconstrained() {
        let tool = ToolDescriptor::new("lookup_user_data", "Fetch user data", None);
        assert_eq!(tool.parameters["type"], "object");
        assert!(tool.parameters["properties"].as_object().unwrap().is_empty());

        let null_schema =
            ToolDescriptor::new("ping", "", Some(serde_json::Value::Null));
        assert_eq!(null_schema.parameters, unconstrained_schema());
    }

    #[test]
    fn descriptor_deserializes_without_parameters() {
        let tool: ToolDescriptor =
            serde_json::from_str(r#"{"name":"ping","description":"Ping"}"#).unwrap();
        assert_eq!(tool.parameters, unconstrained_schema());
    }

    #[test]
    fn usage_total_saturates() {
        assert_eq!(Usage::new(40, 12).total_tokens, 52);
        assert_eq!(Usage::new(u32::MAX, 5).total_tokens, u32::MAX);
    }

    #[test]
    fn blank_text_is_normalized_away() {
        let turn = ProviderTurn::text("   ");
        assert!(turn.text.is_none());
        assert!(turn.is_final());
        assert_eq!(turn.text_or_empty(), "");
    }

    #[test]
    fn turn_with_text_and_tools_keeps_both() {
        let turn = ProviderTurn::tool_calls(vec![ToolCall::new(
            "t1",
            "lookup_user",
            serde_json::json!({"phone": "+919916103095"}),
        )])
        .with_text("Let me check that.");
        assert!(!turn.is_final());
        assert_eq!(turn.text.as_deref(), Some("Let me check that."));
    }

    #[test]
    fn usage_totals() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
