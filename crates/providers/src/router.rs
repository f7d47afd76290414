//! Provider router — builds the configured provider.
//!
//! The selected backend is wrapped in the retry policy, so the agent loop
//! only ever sees errors that survived bounded local retries.

use mcpagent_config::{AppConfig, ProviderKind};
use mcpagent_core::error::ProviderError;
use mcpagent_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::local::LocalProvider;
use crate::openai::OpenAiProvider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// Build the bare adapter for the configured provider, without retries.
pub fn build_base_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let timeout = config.call_timeout();

    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Anthropic => Arc::new(
            AnthropicProvider::new(credential(config)?)?
                .with_base_url(&config.endpoints.anthropic_url)
                .with_timeout(timeout),
        ),
        ProviderKind::OpenAi => Arc::new(
            OpenAiProvider::new("openai", &config.endpoints.openai_url, credential(config)?)?
                .with_timeout(timeout),
        ),
        ProviderKind::Ollama => Arc::new(
            LocalProvider::new(&config.endpoints.ollama_url)?
                .with_timeout(timeout)
                .with_warmup_allowance(config.warmup_allowance()),
        ),
    };

    info!(
        provider = %config.provider,
        model = %config.effective_model(),
        "Provider configured"
    );
    Ok(provider)
}

/// Build the configured provider wrapped in the retry policy.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base = build_base_provider(config)?;
    Ok(Arc::new(RetryingProvider::new(base, retry_policy(config))))
}

pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        rate_limit_attempts: config.retry.rate_limit_attempts.max(1),
        transport_retries: config.retry.transport_retries,
        base_backoff: Duration::from_millis(config.retry.base_backoff_ms),
        max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
    }
}

fn credential(config: &AppConfig) -> Result<String, ProviderError> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::Auth(format!("no API key configured for {}", config.provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_provider_kind() {
        let mut config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };

        config.provider = ProviderKind::Anthropic;
        assert_eq!(build_provider(&config).unwrap().name(), "anthropic");

        config.provider = ProviderKind::OpenAi;
        assert_eq!(build_provider(&config).unwrap().name(), "openai");

        config.provider = ProviderKind::Ollama;
        config.api_key = None;
        assert_eq!(build_provider(&config).unwrap().name(), "ollama");
    }

    #[test]
    fn hosted_provider_without_key_is_auth_error() {
        let config = AppConfig::default();
        let err = build_provider(&config).err().unwrap();
        assert_eq!(err.kind(), "AuthError");
    }

    #[test]
    fn retry_policy_from_config() {
        let mut config = AppConfig::default();
        config.retry.rate_limit_attempts = 5;
        config.retry.max_backoff_ms = 1_000;
        let policy = retry_policy(&config);
        assert_eq!(policy.rate_limit_attempts, 5);
        assert_eq!(policy.transport_retries, 1);
        assert_eq!(policy.backoff(4), Duration::from_secs(1));
    }
}
