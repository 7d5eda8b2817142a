use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use mg_domain::message::ToolDefinition;

/// A locally-implemented tool. Business logic is a black box behind this
/// trait; handlers signal retryable failures with
/// [`mg_domain::Error::ToolFailed`] and `retryable: true`.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, input: serde_json::Value) -> mg_domain::Result<serde_json::Value>;
}

/// Thread-safe registry of local tool handlers and their definitions,
/// keyed by tool name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, (ToolDefinition, Arc<dyn ToolHandler>)>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one under the same name.
    pub fn register(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        tracing::debug!(tool = %definition.name, "local tool registered");
        self.tools
            .write()
            .insert(definition.name.clone(), (definition, handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.read().get(name).map(|(_, h)| h.clone())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.read().values().map(|(d, _)| d.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}
