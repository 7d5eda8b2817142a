use serde::{Deserialize, Serialize};

/// Rolling-summary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Unsummarized messages beyond this count trigger a new summary.
    #[serde(default = "d_40")]
    pub max_messages_before_summary: usize,
    /// The most recent messages are always left out of the summary input.
    #[serde(default = "d_10")]
    pub keep_recent_messages: usize,
    /// Target length passed to the summary provider.
    #[serde(default = "d_2000")]
    pub max_summary_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_messages_before_summary: d_40(),
            keep_recent_messages: d_10(),
            max_summary_chars: d_2000(),
        }
    }
}

fn d_40() -> usize {
    40
}
fn d_10() -> usize {
    10
}
fn d_2000() -> usize {
    2_000
}
