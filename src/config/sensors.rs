//! Sensor binding ingest for the surrounding automation host.
//!
//! Bindings arrive loosely typed: register and unit id may be plain
//! integers or decimal/`0x`-hex strings, and state maps key on stringly
//! integers. A binding that fails validation is rejected individually;
//! the remaining bindings stay usable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConfigValidationError;

pub const DEVICE_TYPE_IMMERGAS_AUDAX_12: &str = "immergas_audax_12";

fn default_scale() -> f64 {
    1.0
}

/// A binding exactly as it appears in the config file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawSensorBinding {
    pub name: String,
    pub register: Value,
    #[serde(default)]
    pub unit_id: Option<Value>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub precision: Option<i32>,
    #[serde(default)]
    pub state_map: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub force_update: bool,
}

/// A validated binding, ready for the post-processing layer.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorBinding {
    pub name: String,
    pub register: u16,
    pub unit_id: Option<u8>,
    pub scale: f64,
    pub offset: f64,
    pub precision: Option<i32>,
    pub state_map: BTreeMap<u16, String>,
    pub unit_of_measurement: Option<String>,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
    pub icon: Option<String>,
    pub force_update: bool,
}

fn parse_numeric(value: &Value, max: u64, what: &str) -> Result<u64, String> {
    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => {
            let text = text.trim();
            if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                u64::from_str_radix(digits, 16).ok()
            } else {
                text.parse().ok()
            }
        }
        _ => None,
    };
    match parsed {
        Some(parsed) if parsed <= max => Ok(parsed),
        Some(parsed) => Err(format!("{what} {parsed} is out of range (max {max})")),
        None => Err(format!("{what} {value} is not a valid number")),
    }
}

fn convert(raw: &RawSensorBinding) -> Result<SensorBinding, String> {
    if raw.name.trim().is_empty() {
        return Err("name cannot be empty".to_string());
    }

    let register = parse_numeric(&raw.register, u64::from(u16::MAX), "register")? as u16;

    let unit_id = match &raw.unit_id {
        Some(value) => Some(parse_numeric(value, u64::from(u8::MAX), "unit_id")? as u8),
        None => None,
    };

    if !raw.scale.is_finite() || raw.scale == 0.0 {
        return Err(format!("scale {} is not usable", raw.scale));
    }
    if !raw.offset.is_finite() {
        return Err(format!("offset {} is not usable", raw.offset));
    }

    let mut state_map = BTreeMap::new();
    if let Some(raw_map) = &raw.state_map {
        for (key, label) in raw_map {
            let value = parse_numeric(
                &Value::String(key.clone()),
                u64::from(u16::MAX),
                "state_map key",
            )? as u16;
            state_map.insert(value, label.clone());
        }
    }

    Ok(SensorBinding {
        name: raw.name.clone(),
        register,
        unit_id,
        scale: raw.scale,
        offset: raw.offset,
        precision: raw.precision,
        state_map,
        unit_of_measurement: raw.unit_of_measurement.clone(),
        device_class: raw.device_class.clone(),
        state_class: raw.state_class.clone(),
        icon: raw.icon.clone(),
        force_update: raw.force_update,
    })
}

/// Validates bindings one by one; a bad binding is reported and skipped.
pub fn ingest_bindings(
    raw: &[RawSensorBinding],
) -> (Vec<SensorBinding>, Vec<ConfigValidationError>) {
    let mut accepted = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for binding in raw {
        match convert(binding) {
            Ok(binding) => accepted.push(binding),
            Err(details) => rejected.push(ConfigValidationError::sensor_binding(
                binding.name.clone(),
                details,
            )),
        }
    }

    (accepted, rejected)
}

/// Bundled sensor templates per device type.
pub fn default_bindings(device_type: &str) -> Vec<SensorBinding> {
    if device_type != DEVICE_TYPE_IMMERGAS_AUDAX_12 {
        return Vec::new();
    }

    let temperature = |name: &str, register: u16| SensorBinding {
        name: name.to_string(),
        register,
        unit_id: None,
        scale: 0.1,
        offset: 0.0,
        precision: Some(1),
        state_map: BTreeMap::new(),
        unit_of_measurement: Some("°C".to_string()),
        device_class: Some("temperature".to_string()),
        state_class: None,
        icon: None,
        force_update: false,
    };

    let mut status_map = BTreeMap::new();
    status_map.insert(1, "Cooling".to_string());
    status_map.insert(2, "Heating".to_string());
    status_map.insert(21, "Off".to_string());
    status_map.insert(22, "Circulator only".to_string());

    vec![
        temperature("Outside temperature", 0x0001),
        temperature("Return temperature", 0x0003),
        temperature("Flow temperature", 0x0004),
        temperature("Calculated system temperature", 0x0030),
        SensorBinding {
            name: "Status".to_string(),
            register: 0x003F,
            unit_id: None,
            scale: 1.0,
            offset: 0.0,
            precision: None,
            state_map: status_map,
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            icon: None,
            force_update: false,
        },
        temperature("Flow setpoint", 0x0005),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawSensorBinding {
        serde_json::from_value(value).expect("raw binding")
    }

    #[test]
    fn test_register_accepts_decimal_hex_and_number() {
        for register in [json!(63), json!("63"), json!("0x3F")] {
            let (accepted, rejected) =
                ingest_bindings(&[raw(json!({ "name": "Status", "register": register }))]);
            assert!(rejected.is_empty());
            assert_eq!(accepted[0].register, 63);
        }
    }

    #[test]
    fn test_defaults_applied() {
        let (accepted, _) = ingest_bindings(&[raw(json!({ "name": "T", "register": 1 }))]);
        let binding = &accepted[0];
        assert_eq!(binding.scale, 1.0);
        assert_eq!(binding.offset, 0.0);
        assert!(binding.unit_id.is_none());
        assert!(!binding.force_update);
    }

    #[test]
    fn test_bad_binding_is_rejected_others_survive() {
        let bindings = [
            raw(json!({ "name": "Good", "register": "0x10" })),
            raw(json!({ "name": "Bad register", "register": "banana" })),
            raw(json!({ "name": "Out of range", "register": 70000 })),
            raw(json!({ "name": "Also good", "register": 2, "unit_id": "0x0A" })),
        ];
        let (accepted, rejected) = ingest_bindings(&bindings);

        assert_eq!(accepted.len(), 2);
        assert_eq!(rejected.len(), 2);
        assert_eq!(accepted[1].unit_id, Some(10));
        assert!(rejected[0].to_string().contains("Bad register"));
    }

    #[test]
    fn test_state_map_keys_parse_as_numbers() {
        let (accepted, rejected) = ingest_bindings(&[raw(json!({
            "name": "Status",
            "register": "0x3F",
            "state_map": { "1": "Cooling", "0x15": "Off" }
        }))]);
        assert!(rejected.is_empty());
        let map = &accepted[0].state_map;
        assert_eq!(map.get(&1).map(String::as_str), Some("Cooling"));
        assert_eq!(map.get(&21).map(String::as_str), Some("Off"));
    }

    #[test]
    fn test_bad_state_map_key_rejects_binding() {
        let (accepted, rejected) = ingest_bindings(&[raw(json!({
            "name": "Status",
            "register": 1,
            "state_map": { "warm": "Heating" }
        }))]);
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_zero_scale_rejected() {
        let (accepted, rejected) =
            ingest_bindings(&[raw(json!({ "name": "T", "register": 1, "scale": 0.0 }))]);
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_default_device_template() {
        let bindings = default_bindings(DEVICE_TYPE_IMMERGAS_AUDAX_12);
        assert_eq!(bindings.len(), 6);
        assert!(bindings.iter().any(|binding| binding.register == 0x003F
            && !binding.state_map.is_empty()));
        assert!(default_bindings("unknown_device").is_empty());
    }
}
