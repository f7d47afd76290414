//! LLM Provider implementations for MCPAgent.
//!
//! All providers implement the `mcpagent_core::Provider` trait.
//! The router builds the configured provider and wraps it in the retry
//! policy.

pub mod anthropic;
mod http;
pub mod local;
pub mod openai;
pub mod retry;
pub mod router;

#[cfg(test)]
mod test_support;

pub use anthropic::AnthropicProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use retry::{RetryPolicy, RetryingProvider};
pub use router::{build_base_provider, build_provider};
