use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key marking a message as a rolling summary.
pub const SUMMARY_KEY: &str = "summary";
/// Metadata key recording the summary format version.
pub const SUMMARY_VERSION_KEY: &str = "summary_version";
/// Metadata key recording the id of the last message the summary covers.
pub const COVERS_UNTIL_KEY: &str = "covers_until";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The outcome of a tool invocation, attached to a tool-role message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// A message in a session's history (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::System, content)
    }

    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, content)
    }

    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, content)
    }

    /// Build a tool-role message carrying a single tool result.
    pub fn tool_result(
        session_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut msg = Self::new(session_id, Role::Tool, "");
        msg.tool_results.push(ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error,
        });
        msg
    }

    /// Whether this message is a rolling summary (system role + sentinel key).
    pub fn is_summary(&self) -> bool {
        self.role == Role::System
            && self
                .metadata
                .get(SUMMARY_KEY)
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    /// Estimated size in characters. This proxy, not tokenization, is the
    /// contract: callers pick char budgets as roughly 4x their token target.
    pub fn estimated_chars(&self) -> usize {
        let mut total = self.content.len();
        for tc in &self.tool_calls {
            total += tc.name.len();
            total += json_chars(&tc.input);
        }
        for tr in &self.tool_results {
            total += tr.content.len();
        }
        total
    }
}

/// Character count of a JSON value as it would be sent on the wire.
fn json_chars(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Null => 0,
        serde_json::Value::String(s) => s.len(),
        other => serde_json::to_string(other).map(|s| s.len()).unwrap_or(0),
    }
}

/// Total estimated characters over a slice of history.
pub fn estimate_history_chars(messages: &[Message]) -> usize {
    messages.iter().map(Message::estimated_chars).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_chars_counts_calls_and_results() {
        let mut msg = Message::assistant("s1", "thinking");
        msg.tool_calls.push(ToolCall {
            id: "c1".into(),
            name: "fetch".into(),
            input: serde_json::json!({"url": "https://example.com"}),
        });
        let est = msg.estimated_chars();
        assert!(est > "thinking".len() + "fetch".len());

        let tool = Message::tool_result("s1", "c1", "result body", false);
        assert_eq!(tool.estimated_chars(), "result body".len());
    }

    #[test]
    fn summary_detection_requires_system_role() {
        let mut msg = Message::user("s1", "not a summary");
        msg.metadata
            .insert(SUMMARY_KEY.into(), serde_json::json!(true));
        assert!(!msg.is_summary());

        let mut sys = Message::system("s1", "summary text");
        sys.metadata
            .insert(SUMMARY_KEY.into(), serde_json::json!(true));
        assert!(sys.is_summary());
    }
}
