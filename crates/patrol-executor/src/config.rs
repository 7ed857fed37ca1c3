use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning shared by every patrol leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum base speed for all legs, m/s
    pub max_speed: f64,
    /// Pause before re-attempting a failed leg
    pub settle_delay_ms: u64,
    /// Consecutive failures after which a skippable leg is abandoned
    pub skip_after_retries: u32,
    /// Countdown between the start announcement and the first leg
    pub start_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_speed: 0.35,
            settle_delay_ms: 500,
            skip_after_retries: 3,
            start_delay_ms: 3000,
        }
    }
}

impl ExecutorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}
