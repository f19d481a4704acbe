// ── Entity presentation ──
//
// Maps device records onto host entities: sensors with units and value
// transforms, on/off switches backed by override bits, and the current
// limit control. Sensor state is kept per entity so total-increasing
// readings never go backwards.

use std::fmt;

use serde::Serialize;
use strum::Display;
use tracing::trace;

use crate::command::Command;
use crate::model::{
    ApplianceInfo, ChargingState, DevId, DeviceKind, DeviceRecord, DeviceStatus, OverrideMask,
};

pub const MANUFACTURER: &str = "cFos";

// ── Sensor specs ────────────────────────────────────────────────────

/// How a raw attribute becomes a displayed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    /// Multiply a numeric reading.
    Scale(f64),
    /// Decode the EVSE `state` code into its label.
    ChargingStateLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClass {
    Power,
    Energy,
    Current,
    Voltage,
}

/// A sensor derived from one device attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    /// Attribute key in the device record.
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub transform: Transform,
}

const fn sensor(
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    device_class: DeviceClass,
    state_class: StateClass,
    transform: Transform,
) -> SensorSpec {
    SensorSpec {
        key,
        name,
        unit: Some(unit),
        device_class: Some(device_class),
        state_class: Some(state_class),
        transform,
    }
}

const fn power(key: &'static str, name: &'static str) -> SensorSpec {
    sensor(key, name, "W", DeviceClass::Power, StateClass::Measurement, Transform::Identity)
}

/// Energy totals arrive in Wh.
const fn energy(key: &'static str, name: &'static str) -> SensorSpec {
    sensor(
        key,
        name,
        "kWh",
        DeviceClass::Energy,
        StateClass::TotalIncreasing,
        Transform::Scale(0.001),
    )
}

/// Phase currents arrive in mA.
const fn current(key: &'static str, name: &'static str) -> SensorSpec {
    sensor(key, name, "A", DeviceClass::Current, StateClass::Measurement, Transform::Scale(0.001))
}

const fn voltage(key: &'static str, name: &'static str) -> SensorSpec {
    sensor(key, name, "V", DeviceClass::Voltage, StateClass::Measurement, Transform::Identity)
}

pub const METER_SENSORS: &[SensorSpec] = &[
    power("power", "Power"),
    energy("import", "Import"),
    energy("export", "Export"),
    current("current_l1", "Current L1"),
    current("current_l2", "Current L2"),
    current("current_l3", "Current L3"),
    voltage("voltage_l1", "Voltage L1"),
    voltage("voltage_l2", "Voltage L2"),
    voltage("voltage_l3", "Voltage L3"),
];

pub const EVSE_SENSORS: &[SensorSpec] = &[
    power("cur_charging_power", "Charging Power"),
    energy("total_energy", "Total Charging Energy"),
    SensorSpec {
        key: "state",
        name: "State",
        unit: None,
        device_class: None,
        state_class: None,
        transform: Transform::ChargingStateLabel,
    },
    current("current_l1", "Current L1"),
    current("current_l2", "Current L2"),
    current("current_l3", "Current L3"),
];

/// Sensors exposed for a device kind. Generic devices expose none.
pub fn sensor_specs(kind: DeviceKind) -> &'static [SensorSpec] {
    match kind {
        DeviceKind::Meter => METER_SENSORS,
        DeviceKind::Evse => EVSE_SENSORS,
        DeviceKind::Generic => &[],
    }
}

impl SensorSpec {
    pub fn is_total_increasing(&self) -> bool {
        self.state_class == Some(StateClass::TotalIncreasing)
    }

    /// Unit for this device. Meter power is reported in VA when `is_va` is set.
    pub fn unit_for(&self, status: &DeviceStatus) -> Option<&'static str> {
        if self.key == "power" && status.flag("is_va") == Some(true) {
            Some("VA")
        } else {
            self.unit
        }
    }

    /// Read and transform the attribute. `None` when it is absent or not
    /// of the expected type.
    pub fn read(&self, status: &DeviceStatus) -> Option<DisplayValue> {
        match self.transform {
            Transform::Identity => status
                .number(self.key)
                .map(DisplayValue::Number)
                .or_else(|| {
                    status
                        .attribute(self.key)
                        .and_then(|v| v.as_str())
                        .map(|s| DisplayValue::Text(s.to_owned()))
                }),
            Transform::Scale(factor) => status
                .number(self.key)
                .map(|v| DisplayValue::Number(v * factor)),
            Transform::ChargingStateLabel => status
                .integer(self.key)
                .map(|code| DisplayValue::Text(ChargingState::from_code(code).to_string())),
        }
    }
}

// ── Display values ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayValue {
    Number(f64),
    Text(String),
}

impl DisplayValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Scaled readings carry float noise (e.g. 123.456000001).
            Self::Number(n) => {
                let rounded = (n * 1000.0).round() / 1000.0;
                write!(f, "{rounded}")
            }
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Displayed state of one sensor entity.
#[derive(Debug, Clone)]
pub struct SensorState {
    spec: &'static SensorSpec,
    value: Option<DisplayValue>,
}

impl SensorState {
    pub fn new(spec: &'static SensorSpec) -> Self {
        Self { spec, value: None }
    }

    pub fn spec(&self) -> &'static SensorSpec {
        self.spec
    }

    pub fn value(&self) -> Option<&DisplayValue> {
        self.value.as_ref()
    }

    /// Take a new reading and return the displayed value.
    ///
    /// The displayed value is replaced when there is none yet, when the
    /// sensor is not total-increasing, or when the new reading is not
    /// lower than the displayed one. A missing attribute keeps the
    /// previous value.
    pub fn apply(&mut self, status: &DeviceStatus) -> Option<&DisplayValue> {
        let Some(new) = self.spec.read(status) else {
            return self.value.as_ref();
        };

        let regressed = self.spec.is_total_increasing()
            && matches!(
                (self.value.as_ref().and_then(DisplayValue::as_f64), new.as_f64()),
                (Some(prev), Some(next)) if next < prev
            );

        if regressed {
            trace!(key = self.spec.key, ?new, "ignoring decreasing total");
        } else {
            self.value = Some(new);
        }
        self.value.as_ref()
    }
}

// ── Switches ────────────────────────────────────────────────────────

/// An on/off entity backed by one override bit. On means the bit is clear.
#[derive(Debug, Clone, Copy)]
pub struct SwitchSpec {
    pub name: &'static str,
    pub bit: u64,
    command: fn(DevId, bool) -> Command,
}

impl SwitchSpec {
    pub fn is_on(&self, status: &DeviceStatus) -> bool {
        !status.overrides().contains(self.bit)
    }

    /// Command that turns the switch on or off.
    pub fn command(&self, dev_id: DevId, on: bool) -> Command {
        (self.command)(dev_id, on)
    }
}

pub const CHARGING_SWITCH: SwitchSpec = SwitchSpec {
    name: "Charging Enabled",
    bit: OverrideMask::CHARGING_DISABLED,
    command: charging_command,
};

pub const RULES_SWITCH: SwitchSpec = SwitchSpec {
    name: "Charging Rules Enabled",
    bit: OverrideMask::RULES_DISABLED,
    command: rules_command,
};

pub const USER_RULES_SWITCH: SwitchSpec = SwitchSpec {
    name: "User Rules Enabled",
    bit: OverrideMask::USER_RULES_DISABLED,
    command: user_rules_command,
};

pub const EVSE_SWITCHES: &[SwitchSpec] = &[CHARGING_SWITCH, RULES_SWITCH, USER_RULES_SWITCH];

fn charging_command(dev_id: DevId, enabled: bool) -> Command {
    Command::SetChargingEnabled { dev_id, enabled }
}

fn rules_command(dev_id: DevId, enabled: bool) -> Command {
    Command::SetChargingRulesEnabled { dev_id, enabled }
}

fn user_rules_command(dev_id: DevId, enabled: bool) -> Command {
    Command::SetUserRulesEnabled { dev_id, enabled }
}

// ── Current limit ───────────────────────────────────────────────────

/// Numeric control for an EVSE's current limit override, in amps.
#[derive(Debug, Clone, Copy)]
pub struct CurrentLimitSpec;

impl CurrentLimitSpec {
    pub const NAME: &'static str = "Current Limit Override";
    pub const UNIT: &'static str = "A";

    pub fn min(status: &DeviceStatus) -> Option<f64> {
        status.min_charging_current_ma().map(|ma| ma / 1000.0)
    }

    pub fn max(status: &DeviceStatus) -> Option<f64> {
        status.max_charging_current_ma().map(|ma| ma / 1000.0)
    }

    /// Active override, or the maximum when none is reported.
    pub fn value(status: &DeviceStatus) -> Option<f64> {
        status
            .override_current_ma()
            .or_else(|| status.max_charging_current_ma())
            .map(|ma| ma / 1000.0)
    }

    pub fn command(dev_id: DevId, amps: f64) -> Command {
        Command::OverrideCurrentLimit { dev_id, amps }
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// Entity unique id: `{serial}_{dev_id}_{name}`.
pub fn unique_id(info: &ApplianceInfo, dev_id: &DevId, name: &str) -> String {
    compose_id(&info.id_prefix(), dev_id, name)
}

fn compose_id(prefix: &str, dev_id: &DevId, name: &str) -> String {
    format!("{prefix}_{dev_id}_{name}")
}

/// Host-side device entry that entities attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// `{serial}_{dev_id}`.
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: Option<String>,
    pub configuration_url: String,
}

impl DeviceDescriptor {
    pub fn new(info: &ApplianceInfo, record: &DeviceRecord) -> Self {
        let status = record.status();
        Self {
            identifier: format!("{}_{}", info.id_prefix(), record.dev_id()),
            name: status.name.clone(),
            manufacturer: MANUFACTURER,
            model: status
                .attribute("model")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            configuration_url: info.url.to_string(),
        }
    }
}

// ── Per-device entity set ───────────────────────────────────────────

/// All entities of one device, with sensor state carried across polls.
#[derive(Debug, Clone)]
pub struct DeviceEntities {
    pub dev_id: DevId,
    pub kind: DeviceKind,
    pub descriptor: DeviceDescriptor,
    prefix: String,
    sensors: Vec<SensorState>,
}

/// One rendered entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityValue {
    pub unique_id: String,
    pub name: &'static str,
    pub platform: Platform,
    pub value: Option<DisplayValue>,
    pub unit: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Sensor,
    Switch,
    Number,
}

impl DeviceEntities {
    pub fn new(info: &ApplianceInfo, record: &DeviceRecord) -> Self {
        Self {
            dev_id: record.dev_id().clone(),
            kind: record.kind(),
            descriptor: DeviceDescriptor::new(info, record),
            prefix: info.id_prefix(),
            sensors: sensor_specs(record.kind())
                .iter()
                .map(SensorState::new)
                .collect(),
        }
    }

    /// Feed a new status into the sensors and render every entity.
    pub fn update(&mut self, status: &DeviceStatus) -> Vec<EntityValue> {
        let mut out = Vec::with_capacity(self.sensors.len() + EVSE_SWITCHES.len() + 1);

        for sensor in &mut self.sensors {
            let value = sensor.apply(status).cloned();
            let spec = sensor.spec();
            out.push(EntityValue {
                unique_id: compose_id(&self.prefix, &self.dev_id, spec.name),
                name: spec.name,
                platform: Platform::Sensor,
                value,
                unit: spec.unit_for(status),
            });
        }

        if self.kind == DeviceKind::Evse {
            for switch in EVSE_SWITCHES {
                out.push(EntityValue {
                    unique_id: compose_id(&self.prefix, &self.dev_id, switch.name),
                    name: switch.name,
                    platform: Platform::Switch,
                    value: Some(DisplayValue::Text(
                        if switch.is_on(status) { "on" } else { "off" }.to_owned(),
                    )),
                    unit: None,
                });
            }
            out.push(EntityValue {
                unique_id: compose_id(&self.prefix, &self.dev_id, CurrentLimitSpec::NAME),
                name: CurrentLimitSpec::NAME,
                platform: Platform::Number,
                value: CurrentLimitSpec::value(status).map(DisplayValue::Number),
                unit: Some(CurrentLimitSpec::UNIT),
            });
        }

        out
    }
}
