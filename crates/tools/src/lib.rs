//! Tool registry client for MCPAgent.
//!
//! Tools are implemented by a remote tool server. This crate discovers the
//! catalog it advertises and invokes tools by name over HTTP.

pub mod http_registry;

pub use http_registry::HttpToolRegistry;
