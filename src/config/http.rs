use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

/// Settings for the history/health HTTP API.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.bind_addr.is_empty() {
            return Err(ConfigValidationError::http("bind_addr cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigValidationError::http("port cannot be 0"));
        }
        Ok(())
    }
}
