//! The core agent loop for MCPAgent.
//!
//! A run follows a **call → act → observe** cycle:
//!
//! 1. **Receive** a user message for a session
//! 2. **Fetch** the tool catalog once for the run
//! 3. **Call** the configured provider with the full history
//! 4. **If tool calls**: invoke them in order, append paired results, go to 3
//! 5. **If text only**: that is the final answer
//!
//! The loop stops at the first text-only turn, at the iteration bound, or
//! when the caller cancels between iterations. Whatever happened is saved
//! back to the session store.

pub mod facade;
pub mod loop_runner;

#[cfg(test)]
mod test_support;

pub use facade::{Agent, SetupError};
pub use loop_runner::{AgentLoop, RunOutcome};
