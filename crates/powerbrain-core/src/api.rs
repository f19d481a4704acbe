// ── Appliance access seam ──
//
// The coordinator talks to the appliance through this trait so polling and
// command serialization can run against an in-memory appliance in tests.

use std::future::Future;

use url::Url;

use powerbrain_api::{ApplianceClient, DeviceInfoResponse, Error, MeterValues};

/// Operations the coordinator needs from an appliance.
///
/// Mirrors the inherent methods of [`ApplianceClient`].
pub trait ApplianceApi: Send + Sync + 'static {
    fn base_url(&self) -> &Url;

    fn fetch_device_info(&self) -> impl Future<Output = Result<DeviceInfoResponse, Error>> + Send;

    fn validate_auth(&self) -> impl Future<Output = Result<(), Error>> + Send;

    fn override_current_limit(
        &self,
        dev_id: &str,
        milliamps: i64,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn set_charging_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn set_rules_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn set_user_rules_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn enter_rfid(
        &self,
        code: &str,
        dev_id: Option<&str>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn set_variable(&self, name: &str, value: &str)
    -> impl Future<Output = Result<(), Error>> + Send;

    fn post_meter_values(
        &self,
        dev_id: &str,
        values: &MeterValues,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

impl ApplianceApi for ApplianceClient {
    fn base_url(&self) -> &Url {
        ApplianceClient::base_url(self)
    }

    fn fetch_device_info(&self) -> impl Future<Output = Result<DeviceInfoResponse, Error>> + Send {
        ApplianceClient::fetch_device_info(self)
    }

    fn validate_auth(&self) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::validate_auth(self)
    }

    fn override_current_limit(
        &self,
        dev_id: &str,
        milliamps: i64,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::override_current_limit(self, dev_id, milliamps)
    }

    fn set_charging_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::set_charging_disabled(self, dev_id, disabled)
    }

    fn set_rules_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::set_rules_disabled(self, dev_id, disabled)
    }

    fn set_user_rules_disabled(
        &self,
        dev_id: &str,
        disabled: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::set_user_rules_disabled(self, dev_id, disabled)
    }

    fn enter_rfid(
        &self,
        code: &str,
        dev_id: Option<&str>,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::enter_rfid(self, code, dev_id)
    }

    fn set_variable(
        &self,
        name: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::set_variable(self, name, value)
    }

    fn post_meter_values(
        &self,
        dev_id: &str,
        values: &MeterValues,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        ApplianceClient::post_meter_values(self, dev_id, values)
    }
}
