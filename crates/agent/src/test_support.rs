//! Scripted doubles shared by the loop and façade tests.

use async_trait::async_trait;
use mcpagent_core::error::{ProviderError, ToolDiscoveryError, ToolInvocationError};
use mcpagent_core::message::ToolCall;
use mcpagent_core::provider::{Provider, ProviderRequest, ProviderTurn, ToolDescriptor, Usage};
use mcpagent_core::tool::ToolRegistry;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Replays scripted outcomes in order, recording every request.
///
/// When the script runs out it keeps returning `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderTurn, ProviderError>>>,
    fallback: Box<dyn Fn(usize) -> Result<ProviderTurn, ProviderError> + Send + Sync>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderTurn, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Box::new(|n| {
                panic!("ScriptedProvider: no more responses (call #{n})")
            }),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A provider that answers with plain text.
    pub fn text(text: &str) -> Self {
        Self::new(vec![Ok(text_turn(text))])
    }

    /// A provider that requests a fresh tool call on every turn, forever.
    pub fn endless_tool_calls(tool: &'static str) -> Self {
        let mut provider = Self::new(vec![]);
        provider.fallback = Box::new(move |n| {
            Ok(tool_turn(vec![ToolCall::new(
                format!("call_{n}"),
                tool,
                serde_json::json!({ "n": n }),
            )]))
        });
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn converse(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| (self.fallback)(n))
    }
}

pub fn text_turn(text: &str) -> ProviderTurn {
    ProviderTurn::text(text)
        .with_usage(Usage::new(10, 5))
        .with_model("mock-model")
}

pub fn tool_turn(calls: Vec<ToolCall>) -> ProviderTurn {
    ProviderTurn::tool_calls(calls)
        .with_usage(Usage::new(10, 5))
        .with_model("mock-model")
}

pub fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, format!("The {name} tool"), None)
}

/// A tool registry with a fixed catalog and canned results.
pub struct MockRegistry {
    catalog: Result<Vec<ToolDescriptor>, ToolDiscoveryError>,
    results: HashMap<String, Result<Value, ToolInvocationError>>,
    invocations: Mutex<Vec<(String, Value)>>,
    list_calls: Mutex<usize>,
    delay: Option<Duration>,
}

impl MockRegistry {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            catalog: Ok(tools.iter().map(|t| descriptor(t)).collect()),
            results: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
            delay: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Discovery always fails.
    pub fn unreachable() -> Self {
        let mut registry = Self::empty();
        registry.catalog = Err(ToolDiscoveryError::Transport("connection refused".into()));
        registry
    }

    pub fn with_result(mut self, tool: &str, result: Result<Value, ToolInvocationError>) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ToolRegistry for MockRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolDiscoveryError> {
        *self.list_calls.lock().unwrap() += 1;
        self.catalog.clone()
    }

    async fn invoke(
        &self,
        tool: &ToolDescriptor,
        arguments: &Value,
    ) -> Result<Value, ToolInvocationError> {
        self.invocations
            .lock()
            .unwrap()
            .push((tool.name.clone(), arguments.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .get(&tool.name)
            .cloned()
            .unwrap_or_else(|| Ok(serde_json::json!({ "ok": true })))
    }
}
