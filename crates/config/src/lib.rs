//! Configuration loading, validation, and management for MCPAgent.
//!
//! Loads configuration from `~/.mcpagent/config.toml` with environment
//! variable overrides. `validate()` is the startup gate: a missing
//! credential for a hosted provider is fatal before any run starts.

use mcpagent_core::AgentConfig;
use mcpagent_core::agent::DEFAULT_SYSTEM_PROMPT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which model backend the agent talks to.
///
/// The numeric form (`0`, `1`, `2`) is accepted from the environment for
/// compatibility with existing deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server (0)
    Ollama,
    /// Anthropic Messages API (1)
    Anthropic,
    /// OpenAI chat completions (2)
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "mistral:latest",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }

    /// Hosted providers need an API key.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// The provider-specific credential variable.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "ollama" | "local" => Ok(Self::Ollama),
            "1" | "anthropic" | "claude" => Ok(Self::Anthropic),
            "2" | "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected 0/ollama, 1/anthropic or 2/openai)"
            ))),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.mcpagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Selected provider
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Model identifier; falls back to the provider's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Credential for the selected hosted provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Provider endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Tool server settings
    #[serde(default)]
    pub tools: ToolServerConfig,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Session persistence
    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Anthropic
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("agent", &self.agent)
            .field("endpoints", &self.endpoints)
            .field("tools", &self.tools)
            .field("retry", &self.retry)
            .field("sessions", &self.sessions)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Overrides the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Per provider call and per tool call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub tools_mandatory: bool,

    /// Tell the model which session it is serving
    #[serde(default = "default_true")]
    pub session_context: bool,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            tools_mandatory: false,
            session_context: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_anthropic_url")]
    pub anthropic_url: String,

    #[serde(default = "default_openai_url")]
    pub openai_url: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Extra time granted to the first local call while the model loads
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_warmup_secs() -> u64 {
    120
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            anthropic_url: default_anthropic_url(),
            openai_url: default_openai_url(),
            ollama_url: default_ollama_url(),
            warmup_secs: default_warmup_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_tool_server_url")]
    pub url: String,

    /// Discover through `/tools/simple` instead of `/tools`
    #[serde(default)]
    pub simple_schema: bool,

    /// Call a tool's advertised direct endpoint when it has one
    #[serde(default = "default_true")]
    pub use_direct_calls: bool,

    /// Tools always routed through the proxy endpoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub force_proxy: Vec<String>,
}

fn default_tool_server_url() -> String {
    "http://localhost:3333".into()
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            url: default_tool_server_url(),
            simple_schema: false,
            use_direct_calls: true,
            force_proxy: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts when the provider rate-limits
    #[serde(default = "default_rate_limit_attempts")]
    pub rate_limit_attempts: u32,

    /// Extra attempts after a transport failure or timeout
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_rate_limit_attempts() -> u32 {
    3
}
fn default_transport_retries() -> u32 {
    1
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_attempts: default_rate_limit_attempts(),
            transport_retries: default_transport_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory for JSON session files; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mcpagent/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    /// A missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// - `DEFAULT_LLM_PROVIDER`: 0/ollama, 1/anthropic, 2/openai
    /// - `MCPAGENT_MODEL`
    /// - `MCPAGENT_API_KEY` (highest priority), then `ANTHROPIC_API_KEY` /
    ///   `OPENAI_API_KEY` for the selected provider
    /// - `MCP_SERVER_URL`
    /// - `OLLAMA_HOST`, `OLLAMA_PORT`
    /// - `LOG_LEVEL`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = lookup("DEFAULT_LLM_PROVIDER") {
            self.provider = provider.parse()?;
        }

        if let Some(model) = lookup("MCPAGENT_MODEL") {
            self.model = Some(model);
        }

        if let Some(key) = lookup("MCPAGENT_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = self.provider.credential_env().and_then(|var| lookup(var));
        }

        if let Some(url) = lookup("MCP_SERVER_URL") {
            self.tools.url = url;
        }

        let host = lookup("OLLAMA_HOST");
        let port = lookup("OLLAMA_PORT");
        if host.is_some() || port.is_some() {
            let host = host.unwrap_or_else(|| "localhost".into());
            let base = if host.starts_with("http://") || host.starts_with("https://") {
                host
            } else {
                format!("http://{host}")
            };
            self.endpoints.ollama_url = match port {
                Some(port) => format!("{}:{}", base.trim_end_matches('/'), port.trim()),
                None => base,
            };
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mcpagent")
    }

    /// The model actually used.
    pub fn effective_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    pub fn warmup_allowance(&self) -> Duration {
        Duration::from_secs(self.endpoints.warmup_secs)
    }

    /// Validate the configuration. Fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(t) = self.agent.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "agent.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.retry.rate_limit_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.rate_limit_attempts must be at least 1".into(),
            ));
        }

        if self.provider.requires_credential() && !self.has_api_key() {
            return Err(ConfigError::MissingCredential {
                provider: self.provider,
                env_var: self.provider.credential_env().unwrap_or("MCPAGENT_API_KEY"),
            });
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Derive the immutable agent configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.effective_model(),
            system_prompt: self
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_iterations: self.agent.max_iterations,
            max_tokens: self.agent.max_tokens,
            temperature: self.agent.temperature,
            call_timeout: self.call_timeout(),
            tools_mandatory: self.agent.tools_mandatory,
            session_context: self.agent.session_context,
        }
    }

    /// The effective configuration as TOML, with the credential redacted.
    pub fn redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.api_key.is_some() {
            shown.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            agent: AgentSettings::default(),
            endpoints: EndpointsConfig::default(),
            tools: ToolServerConfig::default(),
            retry: RetryConfig::default(),
            sessions: SessionsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key for provider {provider}: set {env_var} or MCPAGENT_API_KEY")]
    MissingCredential {
        provider: ProviderKind,
        env_var: &'static str,
    },
}
