// ── Runtime appliance configuration ──
//
// Describes *how* to reach one appliance. Carries credentials and polling
// tuning but never touches disk; the CLI builds an `ApplianceConfig` from
// its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use powerbrain_api::transport::{DEFAULT_TIMEOUT, TlsMode, TransportConfig};
use powerbrain_api::{ApplianceClient, BasicAuth};

use crate::error::CoreError;

/// Default polling interval.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// TLS verification strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Skip verification (appliance behind a self-signed proxy).
    DangerAcceptInvalid,
}

/// Configuration for a single appliance instance.
#[derive(Debug, Clone)]
pub struct ApplianceConfig {
    /// Appliance base URL (e.g. `http://192.168.1.50`).
    pub url: Url,
    /// Basic-auth user. Empty means the appliance is reached without auth.
    pub username: String,
    pub password: SecretString,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Periodic poll interval. Zero disables periodic polling.
    pub scan_interval: Duration,
    pub tls: TlsVerification,
}

impl ApplianceConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            username: "admin".into(),
            password: SecretString::from(String::new()),
            timeout: DEFAULT_TIMEOUT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            tls: TlsVerification::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }

    /// Build the HTTP client for this appliance.
    pub fn build_client(&self) -> Result<ApplianceClient, CoreError> {
        let auth = BasicAuth::from_parts(&self.username, self.password.clone());
        Ok(ApplianceClient::new(
            self.url.clone(),
            auth,
            &self.transport(),
        )?)
    }
}
