use thiserror::Error;

use super::{ConfigValidationError, TransportError};

/// Top-level error type for the sniffer.
#[derive(Error, Debug)]
pub enum SnifferError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Initialization error: {0}")]
    Init(String),
}

impl SnifferError {
    pub fn init(details: impl Into<String>) -> Self {
        SnifferError::Init(details.into())
    }
}
