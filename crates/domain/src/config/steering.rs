use serde::{Deserialize, Serialize};

/// Steering / follow-up queue configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SteeringConfig {
    /// How many steering messages a single poll drains.
    #[serde(default)]
    pub steering_mode: DeliveryMode,
    /// How many follow-up messages a single poll drains.
    #[serde(default)]
    pub follow_up_mode: DeliveryMode,
}

/// How many queued messages one drain call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    #[default]
    OneAtATime,
    All,
}
