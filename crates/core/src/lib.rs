//! # MCPAgent Core
//!
//! Domain types, traits, and error definitions for the MCPAgent runtime.
//! This crate has **no transport dependencies**: it defines the model that
//! the provider adapters, the tool registry client, the session stores and
//! the agent loop all implement against.
//!
//! ## Seams
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] — one implementation per model backend
//! - [`ToolRegistry`] — tool discovery and invocation
//! - [`SessionStore`] — per-session history with per-key serialization
//!
//! Implementations live in their own crates, so the loop can be driven by
//! scripted mocks in tests and by real HTTP clients in production.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentResult, FailureReason, Terminal};
pub use error::{AgentError, ProviderError, SessionError, ToolDiscoveryError, ToolInvocationError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role, ToolCall};
pub use provider::{Provider, ProviderRequest, ProviderTurn, ToolDescriptor, Usage};
pub use session::{Session, SessionGuard, SessionId, SessionLocks, SessionStore};
pub use tool::{ToolCatalog, ToolRegistry};
