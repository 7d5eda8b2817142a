use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single correlated event on the gateway timeline.
///
/// Events are totally ordered by the store's monotonic sequence number;
/// the wall-clock `ts` is advisory.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    /// Monotonic sequence assigned by the store at record time.
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl Event {
    /// Start building an event of the given type.
    pub fn builder(kind: impl Into<String>) -> EventBuilder {
        EventBuilder::new(kind)
    }
}

/// Fluent builder; `seq` is filled in by the store.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            event: Event {
                id: uuid::Uuid::new_v4().to_string(),
                seq: 0,
                kind: kind.into(),
                ts: Utc::now(),
                run_id: None,
                session_id: None,
                tool_call_id: None,
                edge_id: None,
                agent_id: None,
                message_id: None,
                name: None,
                data: HashMap::new(),
                duration_ms: None,
                error: None,
                parent_id: None,
                trace_id: None,
                span_id: None,
            },
        }
    }

    pub fn run_id(mut self, id: impl Into<String>) -> Self {
        self.event.run_id = Some(id.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.event.session_id = Some(id.into());
        self
    }

    pub fn tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.event.tool_call_id = Some(id.into());
        self
    }

    pub fn edge_id(mut self, id: impl Into<String>) -> Self {
        self.event.edge_id = Some(id.into());
        self
    }

    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.event.agent_id = Some(id.into());
        self
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.event.message_id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.event.name = Some(name.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.event.data.insert(key.into(), value);
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.event.duration_ms = Some(ms);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.event.error = Some(error.into());
        self
    }

    pub fn parent_id(mut self, id: impl Into<String>) -> Self {
        self.event.parent_id = Some(id.into());
        self
    }

    pub fn trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.event.trace_id = Some(trace_id.into());
        self.event.span_id = Some(span_id.into());
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}
