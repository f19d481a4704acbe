// Status endpoints
//
// Device list fetch and credential validation.

use tracing::debug;

use crate::client::ApplianceClient;
use crate::error::Error;
use crate::models::DeviceInfoResponse;

impl ApplianceClient {
    /// Fetch appliance parameters and the full device list.
    ///
    /// `GET /cnf?cmd=get_dev_info`
    pub async fn fetch_device_info(&self) -> Result<DeviceInfoResponse, Error> {
        let url = self.cnf_url("get_dev_info", &[])?;
        let info: DeviceInfoResponse = self.get_json(url).await?;
        debug!(devices = info.devices.len(), "device info fetched");
        Ok(info)
    }

    /// Check the configured credentials against an authenticated page.
    ///
    /// `GET /ui/en/sim.htm` -- any non-2xx answer means the credentials
    /// were not accepted.
    pub async fn validate_auth(&self) -> Result<(), Error> {
        let url = self.url("ui/en/sim.htm")?;
        debug!("validating credentials at {}", url);

        let resp = self.send(self.http().get(url), true).await?;
        let status = resp.status();
        if status.is_success() {
            debug!("credentials accepted");
            Ok(())
        } else {
            Err(Error::Authentication {
                status: status.as_u16(),
            })
        }
    }
}
