use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a surviving candidate is picked from the filtered set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Fewest active tool executions; ties broken by earliest connection.
    #[default]
    LeastBusy,
    /// Monotonic counter modulo candidate count over a stable candidate
    /// order (by `connected_at`).
    RoundRobin,
    /// Uniform pick; the PRNG is not cryptographic.
    Random,
}

/// Filter + strategy for picking an edge.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub require_tools: bool,
    pub require_channels: bool,
    pub require_streaming: bool,
    pub require_artifacts: bool,
    /// The edge must serve this channel type.
    pub channel_type: Option<String>,
    /// Every pair must be present in the edge's registration metadata.
    pub metadata: HashMap<String, String>,
    /// For invoke-style selection: the edge must expose this tool.
    pub tool_name: Option<String>,
    pub strategy: SelectionStrategy,
}

impl SelectionCriteria {
    pub fn for_tool(tool_name: impl Into<String>) -> Self {
        Self {
            require_tools: true,
            tool_name: Some(tool_name.into()),
            ..Default::default()
        }
    }

    pub fn for_channel(channel_type: impl Into<String>) -> Self {
        Self {
            require_channels: true,
            channel_type: Some(channel_type.into()),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
