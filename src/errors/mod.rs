mod config;
mod sniffer;
mod transport;

pub use config::ConfigValidationError;
pub use sniffer::SnifferError;
pub use transport::IoOperation;
pub use transport::TransportError;
