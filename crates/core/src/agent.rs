//! Agent configuration and run outcome types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to external tools. \
Use a tool whenever the user's request needs data you do not have, \
and answer in plain language once you have what you need.";

/// Immutable per-agent configuration, chosen once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier passed to the provider
    pub model: String,

    /// System instructions sent with every provider call (never stored in history)
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum provider calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Per-tool-call timeout
    #[serde(default = "default_call_timeout", with = "duration_secs")]
    pub call_timeout: Duration,

    /// Fail the run when the tool catalog cannot be fetched
    #[serde(default)]
    pub tools_mandatory: bool,

    /// Append the session id to the system prompt
    #[serde(default)]
    pub session_context: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_max_iterations() -> u32 {
    8
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_call_timeout() -> Duration {
    Duration::from_secs(120)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: None,
            call_timeout: default_call_timeout(),
            tools_mandatory: false,
            session_context: false,
        }
    }

    /// The system prompt for a run on the given session.
    pub fn system_prompt_for(&self, session_id: &str) -> String {
        if self.session_context {
            format!(
                "{}\n\nThe current session id is {session_id}. \
                 If a tool needs the caller's identity, use this value.",
                self.system_prompt
            )
        } else {
            self.system_prompt.clone()
        }
    }
}

/// Why a run ended without a clean final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    IterationLimitExceeded,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IterationLimitExceeded => "IterationLimitExceeded",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum Terminal {
    Done,
    Failed(FailureReason),
}

impl Terminal {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::Failed(reason) => reason.as_str(),
        }
    }
}

impl std::fmt::Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "Done"),
            Self::Failed(reason) => write!(f, "Failed({})", reason.as_str()),
        }
    }
}

/// What the façade hands back for one `run` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Final answer, or the best partial answer when the run failed
    pub text: String,

    /// Provider calls made during the run
    pub iterations_used: u32,

    pub terminal: Terminal,
}

impl AgentResult {
    pub fn done(text: impl Into<String>, iterations_used: u32) -> Self {
        Self {
            text: text.into(),
            iterations_used,
            terminal: Terminal::Done,
        }
    }

    pub fn failed(text: impl Into<String>, iterations_used: u32, reason: FailureReason) -> Self {
        Self {
            text: text.into(),
            iterations_used,
            terminal: Terminal::Failed(reason),
        }
    }
}
