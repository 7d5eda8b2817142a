use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context packer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Budgets for assembling the prompt sent to the model.
///
/// All sizes are characters — the char-count proxy is the contract.
/// Callers pick `max_chars` as roughly 4x their token target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Total character budget for the packed prompt.
    #[serde(default = "d_400000")]
    pub max_chars: usize,
    /// Maximum number of messages in the packed prompt.
    #[serde(default = "d_200")]
    pub max_messages: usize,
    /// Tool-result bodies longer than this are truncated in the packed copy.
    #[serde(default = "d_30000")]
    pub max_tool_result_chars: usize,
    /// Include the rolling summary (when one exists) at the front.
    #[serde(default = "d_true")]
    pub include_summary: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_chars: d_400000(),
            max_messages: d_200(),
            max_tool_result_chars: d_30000(),
            include_summary: d_true(),
        }
    }
}

fn d_400000() -> usize {
    400_000
}
fn d_200() -> usize {
    200
}
fn d_30000() -> usize {
    30_000
}
fn d_true() -> bool {
    true
}
