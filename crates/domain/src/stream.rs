use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for model completion streaming.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Incremental tool-call data inside a completion stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial JSON for the tool input; concatenated across chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_delta: Option<String>,
}

/// One chunk of a streamed model completion (provider-agnostic).
///
/// The dispatcher is oblivious to provider-specific wire formats; adapters
/// translate into this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_delta: Option<ToolCallDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delta_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn finish(reason: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            usage,
            ..Default::default()
        }
    }
}
