use std::sync::Arc;

use mg_domain::config::SummarizerConfig;
use mg_domain::message::{
    Message, COVERS_UNTIL_KEY, SUMMARY_KEY, SUMMARY_VERSION_KEY,
};
use mg_domain::Result;

/// Produces the actual summary text. Injectable so the gateway can route
/// through any model provider (or a canned implementation in tests).
#[async_trait::async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(&self, messages: &[Message], max_chars: usize) -> Result<String>;
}

/// Detects when unsummarized history has grown past the threshold and
/// produces a fresh rolling-summary message.
pub struct Summarizer {
    config: SummarizerConfig,
    provider: Arc<dyn SummaryProvider>,
}

impl Summarizer {
    pub fn new(config: SummarizerConfig, provider: Arc<dyn SummaryProvider>) -> Self {
        Self { config, provider }
    }

    /// Whether a new summary is due.
    pub fn should_summarize(&self, history: &[Message], current: Option<&Message>) -> bool {
        messages_since(history, current).len() > self.config.max_messages_before_summary
    }

    /// Produce a new summary message, or `None` when none is needed.
    ///
    /// The input to the provider is everything since the current summary
    /// minus the most recent `keep_recent_messages` (those stay verbatim in
    /// the packed prompt), with summary-marked messages skipped.
    pub async fn summarize(
        &self,
        session_id: &str,
        history: &[Message],
        current: Option<&Message>,
    ) -> Result<Option<Message>> {
        if !self.should_summarize(history, current) {
            return Ok(None);
        }

        let since = messages_since(history, current);
        let keep = self.config.keep_recent_messages.min(since.len());
        let to_summarize: Vec<&Message> = since[..since.len() - keep]
            .iter()
            .filter(|m| !m.is_summary())
            .copied()
            .collect();
        let Some(last) = to_summarize.last() else {
            return Ok(None);
        };
        let covers_until = last.id.clone();

        let input: Vec<Message> = to_summarize.into_iter().cloned().collect();
        let text = self
            .provider
            .summarize(&input, self.config.max_summary_chars)
            .await?;

        let mut summary = Message::system(session_id, text);
        summary
            .metadata
            .insert(SUMMARY_KEY.into(), serde_json::json!(true));
        summary
            .metadata
            .insert(SUMMARY_VERSION_KEY.into(), serde_json::json!(1));
        summary
            .metadata
            .insert(COVERS_UNTIL_KEY.into(), serde_json::json!(covers_until));

        tracing::debug!(
            session_id = %session_id,
            summarized = input.len(),
            chars = summary.content.len(),
            "rolling summary created"
        );
        Ok(Some(summary))
    }
}

/// Messages after the point the current summary covers. With no summary
/// (or an unknown covers-until id) the whole history is unsummarized.
fn messages_since<'a>(history: &'a [Message], current: Option<&Message>) -> Vec<&'a Message> {
    let covered_id = current.and_then(|s| {
        s.metadata
            .get(COVERS_UNTIL_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    });
    let start = covered_id
        .and_then(|id| history.iter().position(|m| m.id == id).map(|i| i + 1))
        .unwrap_or(0);
    history[start..].iter().collect()
}
