//! Tool registry trait — the abstraction over the remote tool server.
//!
//! Tools themselves are implemented elsewhere; the core only knows how to
//! discover them and how to invoke one by name.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{ToolDiscoveryError, ToolInvocationError};
use crate::provider::ToolDescriptor;

/// Discovers and invokes externally implemented tools.
///
/// The agent loop calls `list_tools` once per run and `invoke` once per
/// tool call the model emits.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Fetch the current tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolDiscoveryError>;

    /// Invoke a tool from this run's catalog with the given arguments.
    ///
    /// Routing comes from the descriptor itself, so two runs holding
    /// different catalogs never affect each other's calls.
    async fn invoke(
        &self,
        tool: &ToolDescriptor,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolInvocationError>;
}

/// The tool catalog snapshot for a single run.
///
/// Never re-fetched mid-run and never shared across runs.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build a catalog, keeping the first descriptor for a repeated name.
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut tools = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::new();
        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                tracing::warn!(tool = %descriptor.name, "Duplicate tool in catalog, keeping first");
                continue;
            }
            index.insert(descriptor.name.clone(), tools.len());
            tools.push(descriptor);
        }
        Self { tools, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Descriptors in catalog order (for sending to the provider).
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
