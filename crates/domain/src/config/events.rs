use serde::{Deserialize, Serialize};

/// Event store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Maximum events held in memory; overflow evicts the oldest 10%.
    #[serde(default = "d_10000")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: d_10000(),
        }
    }
}

fn d_10000() -> usize {
    10_000
}
