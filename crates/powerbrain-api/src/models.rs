// Wire models for the Powerbrain `/cnf` API.
//
// Only the fields the bridge interprets are typed; everything else is kept
// in flattened maps so readings survive untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Response of `GET /cnf?cmd=get_dev_info`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceInfoResponse {
    pub params: ApplianceParams,
    pub devices: Vec<RawDevice>,
}

/// Appliance-wide parameters (`params` block).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApplianceParams {
    #[serde(default)]
    pub title: String,
    /// Firmware version string, e.g. `"1.24.3"`.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub vsn: Option<Vsn>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApplianceParams {
    /// Serial number from the `vsn` block.
    pub fn serial_number(&self) -> Option<String> {
        self.vsn.as_ref().and_then(Vsn::serial_number)
    }
}

/// Version/serial block nested in `params`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Vsn {
    /// Reported as a string on some firmware and as a number on others.
    #[serde(default)]
    pub serialno: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vsn {
    pub fn serial_number(&self) -> Option<String> {
        match self.serialno.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A single entry of the `devices` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDevice {
    #[serde(deserialize_with = "string_or_number")]
    pub dev_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_enabled: bool,
    #[serde(default)]
    pub is_evse: bool,
    /// Remaining readings and settings (power, currents, `state`, `overrides`, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for dev_id, got {other}"
        ))),
    }
}

/// Flag values accepted by `cmd=override_device&flags=`.
///
/// Lowercase letters clear an override (enable), uppercase letters set it
/// (disable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideFlag {
    EnableCharging,
    DisableCharging,
    EnableChargingRules,
    DisableChargingRules,
    EnableUserRules,
    DisableUserRules,
}

impl OverrideFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnableCharging => "c",
            Self::DisableCharging => "C",
            Self::EnableChargingRules => "e",
            Self::DisableChargingRules => "E",
            Self::EnableUserRules => "u",
            Self::DisableUserRules => "U",
        }
    }
}

/// JSON body of `POST /cnf?cmd=set_ajax_meter`.
///
/// Values are in wire units: currents in milliamps, energies in watt-hours.
/// Absent fields are omitted so the appliance keeps its previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_va: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_va: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<[i64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_wh: Option<f64>,
}
