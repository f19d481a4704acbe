// ── Meter push values ──
//
// User-facing units (A, kWh) for an HTTP-input meter, converted to the
// wire units the appliance expects (mA, Wh).

use serde::{Deserialize, Serialize};

use powerbrain_api::MeterValues;

use super::device::round_to_i64;

/// Voltage assumed for L2/L3 when only L1 is given.
pub const DEFAULT_PHASE_VOLTAGE: f64 = 230.0;

/// Readings to push to a meter. Every field is optional; only the ones
/// given are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    /// Power in W, or VA when `is_va` is set.
    pub power: Option<f64>,
    pub is_va: Option<bool>,
    pub voltage_l1: Option<f64>,
    pub voltage_l2: Option<f64>,
    pub voltage_l3: Option<f64>,
    /// Phase currents in A.
    pub current_l1: Option<f64>,
    pub current_l2: Option<f64>,
    pub current_l3: Option<f64>,
    /// Energy totals in kWh.
    pub import_energy: Option<f64>,
    pub export_energy: Option<f64>,
}

impl MeterReading {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Convert to the `set_ajax_meter` body.
    ///
    /// Voltages and currents are only sent when L1 is present; missing L2/L3
    /// values default to 230 V and 0 A respectively.
    pub fn to_values(&self) -> MeterValues {
        MeterValues {
            power_va: self.power,
            is_va: self.is_va,
            voltage: self.voltage_l1.map(|l1| {
                [
                    l1,
                    self.voltage_l2.unwrap_or(DEFAULT_PHASE_VOLTAGE),
                    self.voltage_l3.unwrap_or(DEFAULT_PHASE_VOLTAGE),
                ]
            }),
            current: self.current_l1.map(|l1| {
                [
                    milliamps(l1),
                    milliamps(self.current_l2.unwrap_or(0.0)),
                    milliamps(self.current_l3.unwrap_or(0.0)),
                ]
            }),
            import_wh: self.import_energy.map(|kwh| kwh * 1000.0),
            export_wh: self.export_energy.map(|kwh| kwh * 1000.0),
        }
    }
}

/// Amps to whole milliamps.
pub fn milliamps(amps: f64) -> i64 {
    round_to_i64(amps * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn l1_only_fills_defaults() {
        let reading = MeterReading {
            voltage_l1: Some(231.5),
            current_l1: Some(6.0),
            ..MeterReading::default()
        };
        let values = reading.to_values();
        assert_eq!(values.voltage, Some([231.5, 230.0, 230.0]));
        assert_eq!(values.current, Some([6000, 0, 0]));
        assert_eq!(values.power_va, None);
    }

    #[test]
    fn phases_without_l1_are_not_sent() {
        let reading = MeterReading {
            voltage_l2: Some(229.0),
            current_l3: Some(2.0),
            ..MeterReading::default()
        };
        let values = reading.to_values();
        assert_eq!(values.voltage, None);
        assert_eq!(values.current, None);
    }

    #[test]
    fn energies_scale_to_watt_hours() {
        let reading = MeterReading {
            power: Some(1380.0),
            is_va: Some(true),
            import_energy: Some(12.5),
            export_energy: Some(0.25),
            ..MeterReading::default()
        };
        let values = reading.to_values();
        assert_eq!(values.import_wh, Some(12500.0));
        assert_eq!(values.export_wh, Some(250.0));
        assert_eq!(values.is_va, Some(true));
        assert_eq!(values.power_va, Some(1380.0));
    }

    #[test]
    fn milliamps_round() {
        assert_eq!(milliamps(6.0), 6000);
        assert_eq!(milliamps(7.4996), 7500);
        assert_eq!(milliamps(0.0), 0);
    }
}
