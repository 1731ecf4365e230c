use serde::{Deserialize, Serialize};

use crate::bus::{DEFAULT_INBOX_CAPACITY, DEFAULT_REPLAY_HISTORY};
use crate::errors::ConfigValidationError;

/// Tuning for the register update fan-out.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Recent events handed to a joining subscriber
    #[serde(default = "default_replay_history")]
    pub replay_history: usize,
    /// Bounded inbox size per subscriber
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_replay_history() -> usize {
    DEFAULT_REPLAY_HISTORY
}

fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replay_history: default_replay_history(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.inbox_capacity == 0 {
            return Err(ConfigValidationError::events("inbox_capacity cannot be 0"));
        }
        Ok(())
    }
}
