// ── Device domain types ──

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use powerbrain_api::RawDevice;

// ── DevId ───────────────────────────────────────────────────────────

/// Appliance-assigned device identifier.
///
/// The wire format carries it as a string or a number; both normalise to
/// the same string form here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevId(String);

impl DevId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DevId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DevId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── DeviceKind ──────────────────────────────────────────────────────

/// What a device can do.
///
/// Fixed once known. A generic record is promoted the first time a poll
/// classifies it as a meter or EVSE, since push-input meters can report no
/// readings until values are pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Generic,
    Meter,
    Evse,
}

/// Attribute keys whose presence marks a device as a meter.
const METER_KEYS: &[&str] = &["is_va", "power", "import", "export", "voltage_l1", "current_l1"];

impl DeviceKind {
    /// Classify a raw device entry.
    pub fn classify(raw: &RawDevice) -> Self {
        if raw.is_evse {
            Self::Evse
        } else if METER_KEYS
            .iter()
            .any(|key| raw.attributes.get(*key).is_some_and(|v| !v.is_null()))
        {
            Self::Meter
        } else {
            Self::Generic
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::Generic => 0,
            Self::Meter => 1,
            Self::Evse => 2,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Meter,
            2 => Self::Evse,
            _ => Self::Generic,
        }
    }
}

// ── ChargingState ───────────────────────────────────────────────────

/// EVSE charging state, decoded from the numeric `state` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    Standby,
    CarConnected,
    Charging,
    ChargingVent,
    Error,
    Offline,
    Unknown(i64),
}

impl ChargingState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Standby,
            2 => Self::CarConnected,
            3 => Self::Charging,
            4 => Self::ChargingVent,
            5 => Self::Error,
            6 => Self::Offline,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Standby => 1,
            Self::CarConnected => 2,
            Self::Charging => 3,
            Self::ChargingVent => 4,
            Self::Error => 5,
            Self::Offline => 6,
            Self::Unknown(code) => code,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Standby => "Standby",
            Self::CarConnected => "Car connected",
            Self::Charging => "Charging",
            Self::ChargingVent => "Charging/vent",
            Self::Error => "Error",
            Self::Offline => "Offline",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for ChargingState {
    /// Renders as `"{code}: {label}"`, e.g. `3: Charging`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.label())
    }
}

// ── OverrideMask ────────────────────────────────────────────────────

/// Bitmask reported in the EVSE `overrides` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideMask(u64);

impl OverrideMask {
    pub const CHARGING_DISABLED: u64 = 0b001;
    pub const RULES_DISABLED: u64 = 0b010;
    pub const USER_RULES_DISABLED: u64 = 0b100;

    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// `true` when every bit of `bit` is set.
    pub fn contains(self, bit: u64) -> bool {
        self.0 & bit == bit
    }

    pub fn charging_enabled(self) -> bool {
        !self.contains(Self::CHARGING_DISABLED)
    }

    pub fn rules_enabled(self) -> bool {
        !self.contains(Self::RULES_DISABLED)
    }

    pub fn user_rules_enabled(self) -> bool {
        !self.contains(Self::USER_RULES_DISABLED)
    }
}

// ── DeviceStatus ────────────────────────────────────────────────────

/// Everything a poll reports about one device.
///
/// Replaced as a whole on every successful poll that includes the device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub enabled: bool,
    pub attributes: Map<String, Value>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn from_raw(raw: RawDevice, fetched_at: DateTime<Utc>) -> Self {
        Self {
            name: raw.name,
            enabled: raw.device_enabled,
            attributes: raw.attributes,
            fetched_at,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// Numeric attribute. Numeric strings are accepted as well.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.attribute(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.attribute(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(round_to_i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.attribute(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            _ => None,
        }
    }

    // ── EVSE helpers ─────────────────────────────────────────────────

    pub fn charging_state(&self) -> Option<ChargingState> {
        self.integer("state").map(ChargingState::from_code)
    }

    pub fn overrides(&self) -> OverrideMask {
        let bits = self
            .integer("overrides")
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0);
        OverrideMask::new(bits)
    }

    /// Lower bound for the current limit, in mA.
    pub fn min_charging_current_ma(&self) -> Option<f64> {
        self.number("min_charging_cur")
    }

    /// Upper bound for the current limit, in mA.
    pub fn max_charging_current_ma(&self) -> Option<f64> {
        self.number("max_charging_cur")
    }

    /// Active current override, in mA.
    pub fn override_current_ma(&self) -> Option<f64> {
        self.number("ov_cur")
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub(crate) fn round_to_i64(value: f64) -> i64 {
    value.round() as i64
}

// ── DeviceRecord ────────────────────────────────────────────────────

/// A device known to the registry.
///
/// The `Arc<DeviceRecord>` is the device's identity: it is created once and
/// kept for the lifetime of the appliance instance. Polls swap the status
/// inside it, so every holder observes the latest readings.
#[derive(Debug)]
pub struct DeviceRecord {
    dev_id: DevId,
    kind: AtomicU8,
    status: ArcSwap<DeviceStatus>,
    stale: AtomicBool,
}

impl DeviceRecord {
    pub fn new(dev_id: DevId, kind: DeviceKind, status: DeviceStatus) -> Self {
        Self {
            dev_id,
            kind: AtomicU8::new(kind.code()),
            status: ArcSwap::from_pointee(status),
            stale: AtomicBool::new(false),
        }
    }

    pub fn dev_id(&self) -> &DevId {
        &self.dev_id
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_code(self.kind.load(Ordering::Acquire))
    }

    /// Upgrade a generic record. Returns `false` if the kind was already known.
    pub(crate) fn promote(&self, kind: DeviceKind) -> bool {
        self.kind
            .compare_exchange(
                DeviceKind::Generic.code(),
                kind.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Current status (cheap `Arc` clone).
    pub fn status(&self) -> Arc<DeviceStatus> {
        self.status.load_full()
    }

    pub fn name(&self) -> String {
        self.status.load().name.clone()
    }

    /// `true` when the latest poll did not report this device.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn replace_status(&self, status: DeviceStatus) {
        self.status.store(Arc::new(status));
        self.stale.store(false, Ordering::Release);
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Flattened, serialisable view for output.
    pub fn view(&self) -> DeviceView {
        let status = self.status();
        DeviceView {
            dev_id: self.dev_id.clone(),
            name: status.name.clone(),
            kind: self.kind(),
            enabled: status.enabled,
            stale: self.is_stale(),
            fetched_at: status.fetched_at,
            attributes: status.attributes.clone(),
        }
    }
}

/// Point-in-time copy of a [`DeviceRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub dev_id: DevId,
    pub name: String,
    pub kind: DeviceKind,
    pub enabled: bool,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    pub attributes: Map<String, Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawDevice {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn evse_flag_wins_classification() {
        let dev = raw(json!({ "dev_id": "E1", "is_evse": true, "power": 10 }));
        assert_eq!(DeviceKind::classify(&dev), DeviceKind::Evse);
    }

    #[test]
    fn meter_detected_by_reading_keys() {
        for key in ["is_va", "power", "import", "export", "voltage_l1", "current_l1"] {
            let mut value = json!({ "dev_id": "M1" });
            value[key] = json!(1);
            let dev = raw(value);
            assert_eq!(DeviceKind::classify(&dev), DeviceKind::Meter, "key {key}");
        }
    }

    #[test]
    fn device_without_readings_is_generic() {
        let dev = raw(json!({ "dev_id": "G1", "name": "Relay", "power": null }));
        assert_eq!(DeviceKind::classify(&dev), DeviceKind::Generic);
    }

    #[test]
    fn charging_state_labels() {
        assert_eq!(ChargingState::from_code(1).to_string(), "1: Standby");
        assert_eq!(ChargingState::from_code(4).to_string(), "4: Charging/vent");
        assert_eq!(ChargingState::from_code(6).to_string(), "6: Offline");
        assert_eq!(ChargingState::from_code(9).to_string(), "9: Unknown");
    }

    #[test]
    fn override_bits() {
        let mask = OverrideMask::new(0b011);
        assert!(!mask.charging_enabled());
        assert!(!mask.rules_enabled());
        assert!(mask.user_rules_enabled());
        assert!(OverrideMask::default().charging_enabled());
    }

    #[test]
    fn status_helpers_read_numeric_strings() {
        let status = DeviceStatus::from_raw(
            raw(json!({
                "dev_id": 3,
                "name": "Wallbox",
                "device_enabled": true,
                "state": "3",
                "overrides": 1,
                "max_charging_cur": 16000
            })),
            Utc::now(),
        );
        assert_eq!(status.charging_state(), Some(ChargingState::Charging));
        assert!(!status.overrides().charging_enabled());
        assert_eq!(status.max_charging_current_ma(), Some(16000.0));
        assert_eq!(status.override_current_ma(), None);
    }

    #[test]
    fn kind_round_trips_through_strum() {
        assert_eq!(DeviceKind::Evse.to_string(), "evse");
        assert_eq!("meter".parse::<DeviceKind>().unwrap(), DeviceKind::Meter);
    }
}
