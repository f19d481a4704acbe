// Write commands
//
// Override, RFID, charging-manager variable and meter push endpoints.
// All of them are query-encoded GETs on `/cnf` except the meter push.

use tracing::debug;

use crate::client::ApplianceClient;
use crate::error::Error;
use crate::models::{MeterValues, OverrideFlag};

impl ApplianceClient {
    /// Override the current limit of an EVSE.
    ///
    /// `GET /cnf?cmd=override_device&dev_id={id}&mamps={milliamps}`
    pub async fn override_current_limit(&self, dev_id: &str, milliamps: i64) -> Result<(), Error> {
        debug!(dev_id, milliamps, "overriding current limit");
        let mamps = milliamps.to_string();
        self.command(
            "override_device",
            &[("dev_id", dev_id), ("mamps", mamps.as_str())],
        )
        .await
    }

    /// Set or clear one override flag.
    ///
    /// `GET /cnf?cmd=override_device&dev_id={id}&flags={flag}`
    pub async fn set_override_flag(&self, dev_id: &str, flag: OverrideFlag) -> Result<(), Error> {
        debug!(dev_id, flag = flag.as_str(), "setting override flag");
        self.command(
            "override_device",
            &[("dev_id", dev_id), ("flags", flag.as_str())],
        )
        .await
    }

    /// Disable (`true`) or enable (`false`) charging.
    pub async fn set_charging_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), Error> {
        let flag = if disabled {
            OverrideFlag::DisableCharging
        } else {
            OverrideFlag::EnableCharging
        };
        self.set_override_flag(dev_id, flag).await
    }

    /// Disable (`true`) or enable (`false`) the charging rules.
    pub async fn set_rules_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), Error> {
        let flag = if disabled {
            OverrideFlag::DisableChargingRules
        } else {
            OverrideFlag::EnableChargingRules
        };
        self.set_override_flag(dev_id, flag).await
    }

    /// Disable (`true`) or enable (`false`) the user-defined charging rules.
    pub async fn set_user_rules_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), Error> {
        let flag = if disabled {
            OverrideFlag::DisableUserRules
        } else {
            OverrideFlag::EnableUserRules
        };
        self.set_override_flag(dev_id, flag).await
    }

    /// Present an RFID code, optionally bound to one EVSE.
    ///
    /// `GET /cnf?cmd=enter_rfid&rfid={code}[&dev_id={id}]`
    ///
    /// Sent without credentials. The appliance answers the same way whether
    /// or not the code was accepted, so only transport failures are errors.
    pub async fn enter_rfid(&self, code: &str, dev_id: Option<&str>) -> Result<(), Error> {
        debug!(dev_id = dev_id.unwrap_or("-"), "entering RFID");
        match dev_id {
            Some(id) if !id.is_empty() => {
                self.fire("enter_rfid", &[("rfid", code), ("dev_id", id)])
                    .await
            }
            _ => self.fire("enter_rfid", &[("rfid", code)]).await,
        }
    }

    /// Write a charging-manager variable.
    ///
    /// `GET /cnf?cmd=set_cm_vars&name={name}&val={value}`
    pub async fn set_variable(&self, name: &str, value: &str) -> Result<(), Error> {
        debug!(name, value, "setting charging manager variable");
        self.command("set_cm_vars", &[("name", name), ("val", value)])
            .await
    }

    /// Push readings for an HTTP-input meter.
    ///
    /// `POST /cnf?cmd=set_ajax_meter&dev_id={id}` with a JSON body.
    pub async fn post_meter_values(&self, dev_id: &str, values: &MeterValues) -> Result<(), Error> {
        debug!(dev_id, "posting meter values");
        self.post_command("set_ajax_meter", &[("dev_id", dev_id)], values)
            .await
    }
}
