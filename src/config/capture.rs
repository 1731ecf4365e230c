use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;
use crate::frame::MAX_FRAME_LEN;

use super::BackoffConfig;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Udp,
    Tcp,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Udp => write!(f, "udp"),
            ConnectionMode::Tcp => write!(f, "tcp"),
        }
    }
}

/// Identity of a capture endpoint; the dedup key for the hub registry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HubAddress {
    pub mode: ConnectionMode,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HubAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.mode, self.host, self.port)
    }
}

/// Configuration for one capture endpoint.
///
/// UDP binds (host, port) and optionally joins an IPv4 multicast group;
/// TCP connects out to (host, port) and reconnects with backoff.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mode: ConnectionMode,
    pub host: String,
    pub port: u16,
    /// IPv4 multicast group to subscribe to (UDP only)
    #[serde(default)]
    pub multicast_group: Option<Ipv4Addr>,
    /// Interface carrying the multicast subscription
    #[serde(default = "default_multicast_interface")]
    pub multicast_interface: Ipv4Addr,
    /// Receive buffer for one UDP datagram
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_multicast_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_buffer_size() -> usize {
    2048
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Udp,
            host: "0.0.0.0".to_string(),
            port: 7777,
            multicast_group: None,
            multicast_interface: default_multicast_interface(),
            buffer_size: default_buffer_size(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Config {
    pub fn address(&self) -> HubAddress {
        HubAddress {
            mode: self.mode,
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.host.is_empty() {
            return Err(ConfigValidationError::capture("host cannot be empty"));
        }

        if self.port == 0 {
            return Err(ConfigValidationError::capture("port cannot be 0"));
        }

        if self.buffer_size < MAX_FRAME_LEN {
            return Err(ConfigValidationError::capture(format!(
                "buffer_size ({}) must hold at least one frame ({MAX_FRAME_LEN})",
                self.buffer_size
            )));
        }

        if let Some(group) = self.multicast_group {
            if self.mode != ConnectionMode::Udp {
                return Err(ConfigValidationError::capture(
                    "multicast_group only applies to udp mode",
                ));
            }
            if !group.is_multicast() {
                return Err(ConfigValidationError::capture(format!(
                    "{group} is not an IPv4 multicast address"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multicast_requires_udp() {
        let config = Config {
            mode: ConnectionMode::Tcp,
            multicast_group: Some(Ipv4Addr::new(239, 0, 0, 1)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multicast_group_must_be_multicast() {
        let config = Config {
            multicast_group: Some(Ipv4Addr::new(192, 168, 1, 1)),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            multicast_group: Some(Ipv4Addr::new(239, 0, 0, 1)),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionMode::Udp).unwrap(),
            "\"udp\""
        );
        let mode: ConnectionMode = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(mode, ConnectionMode::Tcp);
    }
}
