//! Error types for the MCPAgent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, and every member of the
//! taxonomy exposes a stable string name through `kind()` so hosts and test
//! suites in other languages can match on it.

use thiserror::Error;

/// Errors raised by a model provider adapter.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Bad or missing credential. Fatal, never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network-level failure or an unexpected HTTP status.
    #[error("Transport error{}: {message}", status_hint(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("Provider call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The payload could not be turned into a `ProviderTurn`. Fatal.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

fn retry_hint(secs: &Option<u64>) -> String {
    secs.map(|s| format!(", retry after {s}s")).unwrap_or_default()
}

fn status_hint(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status: {s})")).unwrap_or_default()
}

impl ProviderError {
    /// Shorthand for a transport failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Stable name of this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AuthError",
            Self::RateLimited { .. } => "RateLimited",
            Self::Transport { .. } => "TransportError",
            Self::Timeout { .. } => "Timeout",
            Self::MalformedResponse(_) => "MalformedResponse",
        }
    }

    /// Whether a bounded local retry may fix this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

/// The tool catalog could not be fetched.
#[derive(Debug, Clone, Error)]
pub enum ToolDiscoveryError {
    #[error("Tool server unreachable: {0}")]
    Transport(String),

    #[error("Tool server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed tool catalog: {0}")]
    Malformed(String),
}

impl ToolDiscoveryError {
    pub fn kind(&self) -> &'static str {
        "ToolDiscoveryError"
    }
}

/// A single tool invocation failed.
///
/// The agent loop never propagates these; they become tool-result messages.
#[derive(Debug, Clone, Error)]
pub enum ToolInvocationError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool {tool_name} reported an error: {message}")]
    RemoteError { tool_name: String, message: String },

    #[error("Could not reach tool server for {tool_name}: {message}")]
    Transport { tool_name: String, message: String },
}

impl ToolInvocationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::Timeout { .. } => "Timeout",
            Self::RemoteError { .. } => "RemoteError",
            Self::Transport { .. } => "TransportError",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The single error type the agent façade returns.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Discovery failed while tools are configured as mandatory.
    #[error("Tools unavailable: {0}")]
    ToolsUnavailable(ToolDiscoveryError),

    #[error("Session {0} already has a run in flight")]
    SessionBusy(String),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),
}

impl AgentError {
    /// Stable name of the outward-facing error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.kind(),
            Self::ToolsUnavailable(_) => "ToolsUnavailableError",
            Self::SessionBusy(_) => "SessionBusy",
            Self::Session(_) => "SessionStoreError",
        }
    }
}
