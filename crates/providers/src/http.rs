//! HTTP plumbing shared by the hosted and local adapters.
//!
//! Status mapping is uniform across backends: 429 is `RateLimited`,
//! 401/403 is `Auth`, any other non-success status is `Transport`.

use mcpagent_core::error::ProviderError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::transport(format!("Failed to create HTTP client: {e}")))
}

/// Map a failed `send()` into the taxonomy.
pub(crate) fn send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        ProviderError::transport(e.to_string())
    }
}

/// Pass a success response through; turn anything else into an error.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    if code == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        warn!(provider, retry_after_secs, "Rate limited");
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    if code == 401 || code == 403 {
        return Err(ProviderError::Auth(format!(
            "{provider} rejected the credential (status {code}): {}",
            error_message(&body)
        )));
    }

    warn!(provider, status = code, body = %body, "Provider API error");
    Err(ProviderError::Transport {
        status: Some(code),
        message: error_message(&body),
    })
}

/// Read a success body and decode it. A body that does not decode is a
/// `MalformedResponse`, never a guess.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let body = response.text().await.map_err(|e| send_error(e, timeout))?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::MalformedResponse(format!("{provider} response did not decode: {e}"))
    })
}

/// Pull the human-readable message out of a JSON error body, if there is one.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .or_else(|| v.get("message"))
        })
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(
            error_message(r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad tools"}}"#),
            "bad tools"
        );
        assert_eq!(error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_message("upstream exploded"), "upstream exploded");
    }
}
