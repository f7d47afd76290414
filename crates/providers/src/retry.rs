//! Bounded local retry around a provider.
//!
//! - `RateLimited`: exponential backoff, honouring the server's
//!   `retry-after` hint, up to `rate_limit_attempts` total attempts
//! - `Transport` / `Timeout`: retried `transport_retries` times
//! - `Auth` / `MalformedResponse`: returned immediately

use async_trait::async_trait;
use mcpagent_core::error::ProviderError;
use mcpagent_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rate_limit_attempts: u32,
    pub transport_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 3,
            transport_retries: 1,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `n` (1-based): base * 2^(n-1), capped.
    pub fn backoff(&self, n: u32) -> Duration {
        let factor = 1u32 << n.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Wraps a provider with the retry policy.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn converse(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let mut rate_limited = 0u32;
        let mut transport_failures = 0u32;

        loop {
            let error = match self.inner.converse(request.clone()).await {
                Ok(turn) => return Ok(turn),
                Err(e) => e,
            };

            let delay = match &error {
                ProviderError::RateLimited { retry_after_secs } => {
                    rate_limited += 1;
                    if rate_limited >= self.policy.rate_limit_attempts {
                        return Err(error);
                    }
                    retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.policy.backoff(rate_limited))
                        .min(self.policy.max_backoff)
                }
                ProviderError::Transport { .. } | ProviderError::Timeout { .. } => {
                    transport_failures += 1;
                    if transport_failures > self.policy.transport_retries {
                        return Err(error);
                    }
                    self.policy.backoff(transport_failures)
                }
                ProviderError::Auth(_) | ProviderError::MalformedResponse(_) => return Err(error),
            };

            warn!(
                provider = %self.inner.name(),
                error = %error,
                attempt = rate_limited + transport_failures,
                delay_ms = delay.as_millis() as u64,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
