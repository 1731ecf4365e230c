use std::time::Duration;

use crate::config::BackoffConfig;

/// Helper for pacing reconnect attempts.
///
/// There is no attempt limit: a passive capture keeps trying to reach
/// its source until it is stopped.
#[derive(Debug)]
pub struct BackoffStrategy {
    config: BackoffConfig,
    current_attempt: u32,
}

impl BackoffStrategy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current_attempt: 0,
        }
    }

    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.config.initial_interval.as_secs_f64()
            * self.config.multiplier.powi(self.current_attempt as i32);

        let interval =
            Duration::from_secs_f64(interval.min(self.config.max_interval.as_secs_f64()));

        self.current_attempt = (self.current_attempt + 1).min(32);
        interval
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
