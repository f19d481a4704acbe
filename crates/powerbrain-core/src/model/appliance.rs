// ── Appliance-wide information ──

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use powerbrain_api::ApplianceParams;

/// Firmware version reported in `params.version`.
///
/// Only the first two components are compared; anything after the minor
/// number is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for FirmwareVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().trim_start_matches(['v', 'V']).split('.');
        let major = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| format!("invalid firmware version: {s:?}"))?;
        let minor = parts
            .next()
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        Ok(Self { major, minor })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Identity and metadata of one appliance, refreshed on every poll.
#[derive(Debug, Clone, Serialize)]
pub struct ApplianceInfo {
    /// Display name (`params.title`).
    pub title: String,
    pub serial_number: Option<String>,
    pub firmware: Option<FirmwareVersion>,
    /// Raw version string as reported.
    pub version: Option<String>,
    pub url: Url,
}

impl ApplianceInfo {
    pub fn from_params(params: &ApplianceParams, url: &Url) -> Self {
        Self {
            title: params.title.clone(),
            serial_number: params.serial_number(),
            firmware: params.version.as_deref().and_then(|v| v.parse().ok()),
            version: params.version.clone(),
            url: url.clone(),
        }
    }

    /// Prefix for entity unique ids. Falls back to the host when the
    /// appliance does not report a serial number.
    pub fn id_prefix(&self) -> String {
        match &self.serial_number {
            Some(serial) => serial.clone(),
            None => self.url.host_str().unwrap_or("powerbrain").to_owned(),
        }
    }
}
