use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context pruning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Context pruning configuration — trims old tool results in place (on a
/// copy) when history occupies too large a fraction of the model window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Pruning mode.
    #[serde(default)]
    pub mode: PruningMode,
    /// Number of recent assistant messages whose tool results are protected.
    #[serde(default = "d_3u")]
    pub keep_last_assistants: usize,
    /// Ratio of context window at which soft-trim activates.
    #[serde(default = "d_03")]
    pub soft_trim_ratio: f64,
    /// Ratio of context window at which hard-clear activates.
    #[serde(default = "d_05")]
    pub hard_clear_ratio: f64,
    /// Skip the hard pass entirely when prunable bodies sum below this.
    #[serde(default = "d_10000")]
    pub min_prunable_tool_chars: usize,
    /// Tool-name patterns that may be pruned. Empty = all (after deny).
    /// Patterns support a trailing/leading `*` wildcard.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool-name patterns that must never be pruned (secrets etc.).
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub soft_trim: SoftTrimConfig,
    #[serde(default)]
    pub hard_clear: HardClearConfig,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            mode: PruningMode::Off,
            keep_last_assistants: d_3u(),
            soft_trim_ratio: d_03(),
            hard_clear_ratio: d_05(),
            min_prunable_tool_chars: d_10000(),
            allow: Vec::new(),
            deny: Vec::new(),
            soft_trim: SoftTrimConfig::default(),
            hard_clear: HardClearConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruningMode {
    #[default]
    Off,
    CacheTtl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftTrimConfig {
    /// Bodies longer than this are soft-trimmed.
    #[serde(default = "d_4000u")]
    pub max_chars: usize,
    /// Chars to keep from the head.
    #[serde(default = "d_1500")]
    pub head_chars: usize,
    /// Chars to keep from the tail.
    #[serde(default = "d_1500")]
    pub tail_chars: usize,
}

impl Default for SoftTrimConfig {
    fn default() -> Self {
        Self {
            max_chars: 4_000,
            head_chars: 1_500,
            tail_chars: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardClearConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_placeholder")]
    pub placeholder: String,
}

impl Default for HardClearConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            placeholder: d_placeholder(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3u() -> usize {
    3
}
fn d_03() -> f64 {
    0.3
}
fn d_05() -> f64 {
    0.5
}
fn d_10000() -> usize {
    10_000
}
fn d_4000u() -> usize {
    4_000
}
fn d_1500() -> usize {
    1_500
}
fn d_placeholder() -> String {
    "[old tool result cleared]".into()
}
fn d_true() -> bool {
    true
}
