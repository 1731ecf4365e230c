use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

use super::{
    default_bindings, ingest_bindings, CaptureConfig, EventsConfig, HttpConfig, LoggingConfig,
    RawSensorBinding, SensorBinding,
};

/// Top-level sniffer configuration, loaded from a JSON file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub events: EventsConfig,
    pub http: HttpConfig,
    pub log: LoggingConfig,
    /// Packet log path; `null` disables persistence
    pub packet_log: Option<PathBuf>,
    /// Device tag selecting a bundled sensor template
    pub device_type: Option<String>,
    pub sensors: Vec<RawSensorBinding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            events: EventsConfig::default(),
            http: HttpConfig::default(),
            log: LoggingConfig::default(),
            packet_log: Some(PathBuf::from("packets_log.csv")),
            device_type: None,
            sensors: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.capture.validate()?;
        self.events.validate()?;
        self.http.validate()?;
        self.log.validate()?;
        Ok(())
    }

    /// Resolves the active sensor bindings.
    ///
    /// Explicit bindings win; with none configured, the device type's
    /// bundled template applies. Invalid bindings are returned separately
    /// and do not fail the rest.
    pub fn sensor_bindings(&self) -> (Vec<SensorBinding>, Vec<ConfigValidationError>) {
        if self.sensors.is_empty() {
            if let Some(device_type) = &self.device_type {
                return (default_bindings(device_type), Vec::new());
            }
        }
        ingest_bindings(&self.sensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionMode;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).expect("serialise");
        let reparsed: Config = serde_json::from_str(&json).expect("reparse");
        assert!(reparsed.validate().is_ok());
        assert_eq!(reparsed.capture.port, config.capture.port);
    }

    #[test]
    fn test_parses_minimal_file() {
        let config: Config = serde_json::from_str(
            r#"{
                "capture": { "mode": "tcp", "host": "192.168.1.50", "port": 502 },
                "sensors": [
                    { "name": "Outside temperature", "register": "0x0001", "scale": 0.1 }
                ]
            }"#,
        )
        .expect("parse");

        assert_eq!(config.capture.mode, ConnectionMode::Tcp);
        assert_eq!(config.capture.port, 502);

        let (bindings, rejected) = config.sensor_bindings();
        assert!(rejected.is_empty());
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].register, 1);
    }

    #[test]
    fn test_device_type_template_used_when_no_sensors() {
        let config: Config = serde_json::from_str(
            r#"{ "device_type": "immergas_audax_12" }"#,
        )
        .expect("parse");

        let (bindings, rejected) = config.sensor_bindings();
        assert!(rejected.is_empty());
        assert_eq!(bindings.len(), 6);
    }
}
