use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing for TCP reconnect attempts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Wait after the first failure
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    /// Maximum wait time
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    /// Multiplier for each subsequent attempt
    pub multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}
