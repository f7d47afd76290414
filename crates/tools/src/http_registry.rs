//! HTTP tool registry client.
//!
//! Talks to a tool server exposing:
//! - `GET  /tools`         OpenAI function-calling shape, optional `direct_endpoint`
//! - `GET  /tools/simple`  `{name, description, input_schema: {arg: {type, description}}}`
//! - `POST /tools/{name}`  proxy invocation with the argument mapping as JSON body
//!
//! Both catalog shapes are accepted from either endpoint.

use async_trait::async_trait;
use mcpagent_config::ToolServerConfig;
use mcpagent_core::error::{ToolDiscoveryError, ToolInvocationError};
use mcpagent_core::provider::ToolDescriptor;
use mcpagent_core::tool::ToolRegistry;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Holds no per-discovery state: direct endpoints travel on the returned
/// descriptors, so each run routes calls by its own catalog.
pub struct HttpToolRegistry {
    base_url: String,
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
    simple_schema: bool,
    use_direct_calls: bool,
    force_proxy: HashSet<String>,
}

impl HttpToolRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolDiscoveryError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url).map_err(|e| {
            ToolDiscoveryError::Transport(format!("Invalid tool server URL '{base_url}': {e}"))
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ToolDiscoveryError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            base,
            client,
            timeout: Duration::from_secs(120),
            simple_schema: false,
            use_direct_calls: true,
            force_proxy: HashSet::new(),
        })
    }

    /// Build from the `[tools]` config section.
    pub fn from_config(config: &ToolServerConfig, timeout: Duration) -> Result<Self, ToolDiscoveryError> {
        Ok(Self::new(&config.url)?
            .with_timeout(timeout)
            .with_simple_schema(config.simple_schema)
            .with_direct_calls(config.use_direct_calls)
            .with_force_proxy(config.force_proxy.iter().cloned()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Discover through `/tools/simple`.
    pub fn with_simple_schema(mut self, simple: bool) -> Self {
        self.simple_schema = simple;
        self
    }

    pub fn with_direct_calls(mut self, enabled: bool) -> Self {
        self.use_direct_calls = enabled;
        self
    }

    /// Tools that always go through the proxy endpoint.
    pub fn with_force_proxy(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.force_proxy = tools.into_iter().collect();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn discovery_url(&self) -> String {
        if self.simple_schema {
            format!("{}/tools/simple", self.base_url)
        } else {
            format!("{}/tools", self.base_url)
        }
    }

    /// `POST /tools/{name}`, with the name escaped as a single path segment.
    fn proxy_url(&self, name: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("tools").push(name);
        }
        url.to_string()
    }

    /// Where a call to `tool` is sent, and whether that is the direct endpoint.
    fn endpoint_for(&self, tool: &ToolDescriptor) -> (String, bool) {
        if !self.use_direct_calls || self.force_proxy.contains(&tool.name) {
            return (self.proxy_url(&tool.name), false);
        }
        match &tool.direct_endpoint {
            Some(url) => (url.clone(), true),
            None => {
                debug!(tool = %tool.name, "No direct endpoint, using proxy");
                (self.proxy_url(&tool.name), false)
            }
        }
    }

    fn absolute(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            endpoint.to_string()
        }
    }

    /// Health check — is the tool server reachable?
    pub async fn ping(&self) -> Result<(), ToolDiscoveryError> {
        self.client
            .get(format!("{}/", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolDiscoveryError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn parse_catalog(body: &Value) -> Result<Vec<ToolDescriptor>, ToolDiscoveryError> {
    let items = body
        .as_array()
        .or_else(|| body.get("tools").and_then(Value::as_array))
        .ok_or_else(|| ToolDiscoveryError::Malformed("expected a JSON array of tools".into()))?;

    items.iter().enumerate().map(|(i, item)| parse_entry(i, item)).collect()
}

/// One catalog entry, parsed from either shape.
fn parse_entry(index: usize, item: &Value) -> Result<ToolDescriptor, ToolDiscoveryError> {
    // OpenAI shape nests everything under "function"
    let function = item.get("function").filter(|f| f.is_object()).unwrap_or(item);

    let name = function
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ToolDiscoveryError::Malformed(format!("tool #{index} has no name")))?;

    let description = function
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let schema = match (function.get("parameters"), function.get("input_schema")) {
        (Some(p), _) if !p.is_null() => Some(p.clone()),
        (_, Some(s)) if !s.is_null() => Some(normalize_simple_schema(s)),
        _ => None,
    };
    if let Some(ref s) = schema {
        if !s.is_object() {
            return Err(ToolDiscoveryError::Malformed(format!(
                "tool '{name}' has a non-object parameter schema"
            )));
        }
    }

    let mut descriptor = ToolDescriptor::new(name, description, schema);
    if let Some(endpoint) = function
        .get("direct_endpoint")
        .or_else(|| item.get("direct_endpoint"))
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
    {
        descriptor = descriptor.with_direct_endpoint(endpoint);
    }
    Ok(descriptor)
}

/// A simple `input_schema` maps argument names to `{type, description}`.
/// A value that already looks like JSON Schema is kept as is.
fn normalize_simple_schema(schema: &Value) -> Value {
    if schema.get("type").is_some() || schema.get("properties").is_some() {
        return schema.clone();
    }
    match schema.as_object() {
        Some(props) => serde_json::json!({
            "type": "object",
            "properties": props,
        }),
        None => schema.clone(),
    }
}

/// Pull the failure message out of a tool server error body.
fn remote_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("detail").or_else(|| v.get("error")))
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ToolRegistry for HttpToolRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolDiscoveryError> {
        let url = self.discovery_url();
        debug!(url = %url, "Discovering tools");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolDiscoveryError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolDiscoveryError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ToolDiscoveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ToolDiscoveryError::Malformed(format!("catalog is not JSON: {e}")))?;
        let entries = parse_catalog(&json)?;

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(entries.len());
        for mut descriptor in entries {
            if !seen.insert(descriptor.name.clone()) {
                warn!(tool = %descriptor.name, "Duplicate tool in catalog, keeping first");
                continue;
            }
            descriptor.direct_endpoint = descriptor
                .direct_endpoint
                .map(|endpoint| self.absolute(&endpoint));
            descriptors.push(descriptor);
        }

        info!(count = descriptors.len(), "Discovered tools");
        Ok(descriptors)
    }

    async fn invoke(
        &self,
        tool: &ToolDescriptor,
        arguments: &Value,
    ) -> Result<Value, ToolInvocationError> {
        let name = tool.name.as_str();
        let (url, direct) = self.endpoint_for(tool);
        let started = Instant::now();
        info!(tool = name, direct, "Invoking tool");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(arguments)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolInvocationError::Timeout {
                        tool_name: name.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    ToolInvocationError::Transport {
                        tool_name: name.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ToolInvocationError::Transport {
            tool_name: name.to_string(),
            message: e.to_string(),
        })?;

        if status.as_u16() == 404 {
            return Err(ToolInvocationError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            warn!(tool = name, status = status.as_u16(), body = %body, "Tool reported failure");
            return Err(ToolInvocationError::RemoteError {
                tool_name: name.to_string(),
                message: remote_message(&body),
            });
        }

        debug!(tool = name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool finished");
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
