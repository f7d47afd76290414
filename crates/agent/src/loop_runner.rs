//! The agent reasoning loop implementation.

use chrono::Utc;
use mcpagent_core::agent::{AgentConfig, AgentResult, FailureReason};
use mcpagent_core::error::{AgentError, ToolInvocationError};
use mcpagent_core::event::{DomainEvent, EventBus};
use mcpagent_core::message::{Message, ToolCall};
use mcpagent_core::provider::{Provider, ProviderRequest};
use mcpagent_core::session::SessionId;
use mcpagent_core::tool::{ToolCatalog, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Answer used when a run stops without any assistant text to fall back on.
pub const ITERATION_LIMIT_FALLBACK: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

pub const CANCELLED_FALLBACK: &str = "The request was cancelled before an answer was produced.";

/// What one run produced: the messages to persist, and how it ended.
///
/// `appended` always starts with the user message and is kept even when
/// `result` is an error, so partial progress can be saved.
#[derive(Debug)]
pub struct RunOutcome {
    pub appended: Vec<Message>,
    pub result: Result<AgentResult, AgentError>,
}

/// The core agent loop that orchestrates provider calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolRegistry>,
    config: AgentConfig,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolRegistry>,
        config: AgentConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
            event_bus,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<dyn ToolRegistry> {
        &self.tools
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Fetch the tool catalog for one run.
    ///
    /// A discovery failure degrades to an empty catalog unless tools are
    /// mandatory.
    async fn fetch_catalog(&self, session_id: &SessionId) -> Result<ToolCatalog, AgentError> {
        match self.tools.list_tools().await {
            Ok(descriptors) => Ok(ToolCatalog::new(descriptors)),
            Err(e) if self.config.tools_mandatory => {
                warn!(session_id = %session_id, error = %e, "Tool discovery failed, tools are mandatory");
                Err(AgentError::ToolsUnavailable(e))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Tool discovery failed, continuing without tools");
                Ok(ToolCatalog::empty())
            }
        }
    }

    /// Drive one run over `history` plus the new user message.
    ///
    /// `history` is not modified; everything the run adds comes back in
    /// [`RunOutcome::appended`].
    pub async fn run(
        &self,
        session_id: &SessionId,
        history: &[Message],
        user_message: Message,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let start = history.len();
        let mut conversation = history.to_vec();
        conversation.push(user_message);

        let result = self.drive(session_id, &mut conversation, cancel).await;

        if let Ok(ref outcome) = result {
            self.event_bus.publish(DomainEvent::RunFinished {
                session_id: session_id.to_string(),
                terminal: outcome.terminal,
                iterations_used: outcome.iterations_used,
                timestamp: Utc::now(),
            });
        }

        RunOutcome {
            appended: conversation.split_off(start),
            result,
        }
    }

    async fn drive(
        &self,
        session_id: &SessionId,
        conversation: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let catalog = self.fetch_catalog(session_id).await?;

        info!(
            session_id = %session_id,
            messages = conversation.len(),
            tools = catalog.len(),
            "Processing run"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            session_id: session_id.to_string(),
            tools_available: catalog.len(),
            timestamp: Utc::now(),
        });

        let system = self.config.system_prompt_for(session_id.as_str());
        let mut last_text: Option<String> = None;
        let mut iterations = 0u32;

        while iterations < self.config.max_iterations {
            if cancel.is_cancelled() {
                info!(session_id = %session_id, iterations, "Run cancelled");
                let text = last_text.unwrap_or_else(|| CANCELLED_FALLBACK.to_string());
                return Ok(AgentResult::failed(text, iterations, FailureReason::Cancelled));
            }
            iterations += 1;
            debug!(session_id = %session_id, iteration = iterations, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.config.model.clone(),
                system: Some(system.clone()),
                messages: conversation.clone(),
                tools: catalog.descriptors().to_vec(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let turn = match self.provider.converse(request).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        iteration = iterations,
                        provider = %self.provider.name(),
                        error = %e,
                        "Provider call failed"
                    );
                    return Err(AgentError::Provider(e));
                }
            };

            self.event_bus.publish(DomainEvent::ProviderResponded {
                session_id: session_id.to_string(),
                iteration: iterations,
                model: turn.model.clone(),
                tool_calls: turn.tool_calls.len(),
                tokens_used: turn.usage.as_ref().map_or(0, |u| u.total_tokens),
                timestamp: Utc::now(),
            });

            if turn.is_final() {
                let text = turn.text_or_empty().to_string();
                conversation.push(Message::assistant(text.clone()));
                info!(session_id = %session_id, iterations, "Run finished");
                return Ok(AgentResult::done(text, iterations));
            }

            if let Some(text) = turn.text.as_ref().filter(|t| !t.trim().is_empty()) {
                last_text = Some(text.clone());
            }

            debug!(tool_count = turn.tool_calls.len(), "Executing tool calls");
            let calls = turn.tool_calls;
            conversation.push(Message::assistant_with_tools(
                turn.text.unwrap_or_default(),
                calls.clone(),
            ));

            // Sequential: later calls may depend on earlier results
            for call in &calls {
                let message = self.execute_tool(session_id, &catalog, call).await;
                conversation.push(message);
            }
        }

        warn!(
            session_id = %session_id,
            iterations,
            "Max tool iterations reached"
        );
        let text = last_text.unwrap_or_else(|| ITERATION_LIMIT_FALLBACK.to_string());
        Ok(AgentResult::failed(
            text,
            iterations,
            FailureReason::IterationLimitExceeded,
        ))
    }

    /// Run one tool call and turn the outcome into its paired tool message.
    async fn execute_tool(
        &self,
        session_id: &SessionId,
        catalog: &ToolCatalog,
        call: &ToolCall,
    ) -> Message {
        let started = Instant::now();

        let result = if let Some(tool) = catalog.get(&call.name) {
            match tokio::time::timeout(
                self.config.call_timeout,
                self.tools.invoke(tool, &call.arguments),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ToolInvocationError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.config.call_timeout.as_secs(),
                }),
            }
        } else {
            // Not advertised, so the registry is never asked
            Err(ToolInvocationError::NotFound(call.name.clone()))
        };

        self.event_bus.publish(DomainEvent::ToolInvoked {
            session_id: session_id.to_string(),
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        match result {
            Ok(value) => Message::tool_result(&call.id, render_result(&value)),
            Err(e) => {
                warn!(session_id = %session_id, tool = %call.name, error = %e, "Tool execution failed");
                Message::tool_error(&call.id, render_error(&e))
            }
        }
    }
}

fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Failure content the model can read and react to.
fn render_error(error: &ToolInvocationError) -> String {
    serde_json::json!({
        "error": error.kind(),
        "message": error.to_string(),
    })
    .to_string()
}
