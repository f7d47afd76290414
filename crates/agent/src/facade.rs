//! The agent façade: one `run` call per user message.
//!
//! Composes the session store, the agent loop, the provider and the tool
//! registry. Runs on the same session are serialized through the store's
//! run locks; runs on distinct sessions proceed in parallel.

use mcpagent_config::{AppConfig, ConfigError};
use mcpagent_core::agent::{AgentConfig, AgentResult};
use mcpagent_core::error::{AgentError, ProviderError, ToolDiscoveryError};
use mcpagent_core::event::EventBus;
use mcpagent_core::message::Message;
use mcpagent_core::provider::{Provider, ToolDescriptor};
use mcpagent_core::session::{SessionGuard, SessionId, SessionStore};
use mcpagent_core::tool::ToolRegistry;
use mcpagent_sessions::{FileSessionStore, InMemorySessionStore};
use mcpagent_tools::HttpToolRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::loop_runner::AgentLoop;

/// Failure to assemble an [`Agent`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to set up tool registry: {0}")]
    Tools(#[from] ToolDiscoveryError),
}

pub struct Agent {
    agent_loop: AgentLoop,
    store: Arc<dyn SessionStore>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolRegistry>,
        store: Arc<dyn SessionStore>,
        config: AgentConfig,
    ) -> Self {
        Self::with_event_bus(provider, tools, store, config, Arc::new(EventBus::default()))
    }

    pub fn with_event_bus(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolRegistry>,
        store: Arc<dyn SessionStore>,
        config: AgentConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            agent_loop: AgentLoop::new(provider, tools, config, event_bus),
            store,
        }
    }

    /// Assemble an agent from application config.
    ///
    /// Fails when the selected provider has no credential.
    pub fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        config.validate()?;

        let provider = mcpagent_providers::build_provider(config)?;
        let tools = Arc::new(HttpToolRegistry::from_config(
            &config.tools,
            config.call_timeout(),
        )?);
        let store: Arc<dyn SessionStore> = match &config.sessions.dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Using file session store");
                Arc::new(FileSessionStore::new(dir))
            }
            None => Arc::new(InMemorySessionStore::new()),
        };

        Ok(Self::new(provider, tools, store, config.agent_config()))
    }

    pub fn config(&self) -> &AgentConfig {
        self.agent_loop.config()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.agent_loop.event_bus()
    }

    /// The live tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolDiscoveryError> {
        self.agent_loop.tools().list_tools().await
    }

    /// Answer one message, waiting for any in-flight run on the session.
    pub async fn run(&self, session_id: &str, message: &str) -> Result<AgentResult, AgentError> {
        self.run_with_cancel(session_id, message, CancellationToken::new())
            .await
    }

    /// Like [`Agent::run`], stopping between iterations once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        session_id: &str,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let id = SessionId::new(session_id);
        let guard = self.store.acquire(&id).await;
        self.run_locked(guard, message, &cancel).await
    }

    /// Like [`Agent::run`], but rejects with `SessionBusy` instead of queueing.
    pub async fn try_run(&self, session_id: &str, message: &str) -> Result<AgentResult, AgentError> {
        let id = SessionId::new(session_id);
        let guard = self
            .store
            .try_acquire(&id)
            .ok_or_else(|| AgentError::SessionBusy(session_id.to_string()))?;
        self.run_locked(guard, message, &CancellationToken::new())
            .await
    }

    async fn run_locked(
        &self,
        guard: SessionGuard,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let id = guard.session_id().clone();
        let session = self.store.load(&id).await?;

        let outcome = self
            .agent_loop
            .run(&id, &session.history, Message::user(message), cancel)
            .await;

        // Persist whatever the run produced, success or not
        let saved = self.store.append_and_save(&id, outcome.appended).await;
        drop(guard);

        match (outcome.result, saved) {
            (Ok(result), Ok(_)) => Ok(result),
            (Ok(_), Err(e)) => {
                error!(session_id = %id, error = %e, "Failed to save session");
                Err(AgentError::Session(e))
            }
            (Err(run_error), Ok(_)) => Err(run_error),
            (Err(run_error), Err(e)) => {
                error!(session_id = %id, error = %e, "Failed to save session after run error");
                Err(run_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use mcpagent_core::agent::{FailureReason, Terminal};
    use mcpagent_core::message::{Role, ToolCall};
    use mcpagent_core::provider::ProviderTurn;
    use std::time::Duration;

    fn build_agent(
        provider: Arc<ScriptedProvider>,
        tools: Arc<MockRegistry>,
    ) -> (Agent, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let agent = Agent::new(provider, tools, store.clone(), AgentConfig::new("mock-model"));
        (agent, store)
    }

    #[tokio::test]
    async fn run_persists_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_turn("Hello")),
            Ok(text_turn("Still here")),
        ]));
        let (agent, store) = build_agent(provider.clone(), Arc::new(MockRegistry::empty()));

        let result = agent.run("s1", "Hi").await.unwrap();
        assert_eq!(result, AgentResult::done("Hello", 1));

        agent.run("s1", "Are you there?").await.unwrap();
        let session = store.load(&SessionId::new("s1")).await.unwrap();
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history[2].content, "Are you there?");

        // The second run saw the first exchange
        assert_eq!(provider.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn provider_failure_keeps_user_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Auth(
            "bad key".into(),
        ))]));
        let (agent, store) = build_agent(provider, Arc::new(MockRegistry::empty()));

        let err = agent.run("s1", "Hi").await.unwrap_err();
        assert_eq!(err.kind(), "AuthError");

        let session = store.load(&SessionId::new("s1")).await.unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].role, Role::User);
    }

    #[tokio::test]
    async fn failed_run_persists_partial_progress() {
        let provider = Arc::new(ScriptedProvider::endless_tool_calls("lookup_user"));
        let tools = Arc::new(MockRegistry::new(&["lookup_user"]));
        let store = Arc::new(InMemorySessionStore::new());
        let mut config = AgentConfig::new("mock-model");
        config.max_iterations = 3;
        let agent = Agent::new(provider, tools, store.clone(), config);

        let result = agent.run("s1", "loop").await.unwrap();
        assert_eq!(result.terminal, Terminal::Failed(FailureReason::IterationLimitExceeded));

        let session = store.load(&SessionId::new("s1")).await.unwrap();
        // user + 3 x (assistant + tool result)
        assert_eq!(session.history.len(), 7);
        assert!(session.tool_pairing_holds());
    }

    #[tokio::test]
    async fn tool_failures_never_abort_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_turn(vec![ToolCall::new("t1", "lookup_user", serde_json::json!({}))])),
            Ok(text_turn("Sorry, that failed")),
        ]));
        let tools = Arc::new(MockRegistry::new(&["lookup_user"]).with_result(
            "lookup_user",
            Err(mcpagent_core::error::ToolInvocationError::Timeout {
                tool_name: "lookup_user".into(),
                timeout_secs: 1,
            }),
        ));
        let (agent, store) = build_agent(provider, tools);

        let result = agent.run("s1", "Who am I?").await.unwrap();
        assert!(result.terminal.is_done());
        assert!(store.load(&SessionId::new("s1")).await.unwrap().tool_pairing_holds());
    }

    #[tokio::test]
    async fn same_session_runs_queue_and_never_interleave() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                Ok(tool_turn(vec![ToolCall::new("a1", "lookup_user", serde_json::json!({}))])),
                Ok(text_turn("first")),
                Ok(tool_turn(vec![ToolCall::new("b1", "lookup_user", serde_json::json!({}))])),
                Ok(text_turn("second")),
            ])
            .with_delay(Duration::from_millis(20)),
        );
        let tools = Arc::new(MockRegistry::new(&["lookup_user"]));
        let (agent, store) = build_agent(provider, tools);
        let agent = Arc::new(agent);

        let a = tokio::spawn({
            let agent = agent.clone();
            async move { agent.run("shared", "one").await }
        });
        let b = tokio::spawn({
            let agent = agent.clone();
            async move { agent.run("shared", "two").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let session = store.load(&SessionId::new("shared")).await.unwrap();
        assert_eq!(session.history.len(), 8);
        assert!(session.tool_pairing_holds());
        // Each run's four messages are contiguous
        let roles: Vec<_> = session.history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn distinct_sessions_are_isolated() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_turn("for a")),
            Ok(text_turn("for b")),
        ]));
        let (agent, store) = build_agent(provider.clone(), Arc::new(MockRegistry::empty()));

        agent.run("a", "hello from a").await.unwrap();
        agent.run("b", "hello from b").await.unwrap();

        let b = store.load(&SessionId::new("b")).await.unwrap();
        assert_eq!(b.history.len(), 2);
        assert!(b.history.iter().all(|m| !m.content.contains("from a")));
        assert_eq!(provider.requests()[1].messages.len(), 1);
    }

    #[tokio::test]
    async fn try_run_rejects_busy_session() {
        let provider = Arc::new(ScriptedProvider::text("ok"));
        let (agent, store) = build_agent(provider, Arc::new(MockRegistry::empty()));

        let held = store.acquire(&SessionId::new("s1")).await;
        let err = agent.try_run("s1", "Hi").await.unwrap_err();
        assert_eq!(err.kind(), "SessionBusy");
        drop(held);

        assert!(agent.try_run("s1", "Hi").await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_persists_partial_history() {
        let provider = Arc::new(ScriptedProvider::endless_tool_calls("lookup_user"));
        let tools = Arc::new(MockRegistry::new(&["lookup_user"]).with_delay(Duration::from_millis(50)));
        let (agent, store) = build_agent(provider.clone(), tools);
        let agent = Arc::new(agent);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let agent = agent.clone();
            let cancel = cancel.clone();
            async move { agent.run_with_cancel("s1", "loop", cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.terminal, Terminal::Failed(FailureReason::Cancelled));
        assert!(result.iterations_used >= 1);
        assert!(result.iterations_used < 8);

        let session = store.load(&SessionId::new("s1")).await.unwrap();
        assert_eq!(session.history.len(), 1 + 2 * result.iterations_used as usize);
        assert!(session.tool_pairing_holds());
    }

    #[tokio::test]
    async fn empty_message_is_forwarded_unchanged() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ProviderTurn::text("?"))]));
        let (agent, _) = build_agent(provider.clone(), Arc::new(MockRegistry::empty()));

        agent.run("s1", "").await.unwrap();
        assert_eq!(provider.requests()[0].messages[0].content, "");
    }

    #[test]
    fn from_config_requires_credential() {
        let config = AppConfig::default();
        let err = Agent::from_config(&config).err().unwrap();
        assert!(matches!(err, SetupError::Config(ConfigError::MissingCredential { .. })));
    }

    #[tokio::test]
    async fn from_config_builds_local_agent() {
        let config = AppConfig {
            provider: mcpagent_config::ProviderKind::Ollama,
            ..AppConfig::default()
        };
        let agent = Agent::from_config(&config).unwrap();
        assert_eq!(agent.config().model, "mistral:latest");
        assert_eq!(agent.config().max_iterations, 8);
    }
}
