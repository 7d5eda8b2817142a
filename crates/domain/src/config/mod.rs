mod context;
mod dispatcher;
mod edges;
mod events;
mod executor;
mod pruning;
mod server;
mod steering;
mod summarizer;

pub use context::*;
pub use dispatcher::*;
pub use edges::*;
pub use events::*;
pub use executor::*;
pub use pruning::*;
pub use server::*;
pub use steering::*;
pub use summarizer::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub edges: EdgesConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub packer: PackerConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub steering: SteeringConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl Config {
    /// Load config from a TOML file. A missing file yields defaults so the
    /// gateway can start with no config at all.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}
