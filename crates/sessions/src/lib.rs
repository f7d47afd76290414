//! Session store implementations for MCPAgent.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileSessionStore;
pub use in_memory::InMemorySessionStore;
