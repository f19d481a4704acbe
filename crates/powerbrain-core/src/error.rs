// ── Core error types ──
//
// User-facing errors from powerbrain-core. Consumers never see raw HTTP
// details; the `From<powerbrain_api::Error>` impl translates transport-layer
// errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup errors ─────────────────────────────────────────────────
    #[error("Appliance at {url} is not ready: {reason}")]
    ApplianceNotReady { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Cannot reach appliance: {reason}")]
    Network { reason: String },

    #[error("Appliance did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Unexpected appliance response: {message}")]
    Protocol { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Appliance rejected '{command}' (HTTP {status})")]
    CommandRejected { command: String, status: u16 },

    #[error("Device not found: {dev_id}")]
    DeviceNotFound { dev_id: String },

    #[error("Operation not supported: {operation} on {dev_id} (device is {kind})")]
    Unsupported {
        operation: String,
        dev_id: String,
        kind: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Coordinator is not running")]
    NotConnected,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the host should do with an instance whose setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFailure {
    /// The appliance was unreachable or answered garbage; try again later.
    RetryLater,
    /// The credentials were rejected; the user has to reconfigure.
    Reconfigure,
}

impl CoreError {
    /// Classify a setup error for the host.
    pub fn setup_failure(&self) -> SetupFailure {
        match self {
            Self::AuthenticationFailed { .. } => SetupFailure::Reconfigure,
            _ => SetupFailure::RetryLater,
        }
    }

    /// Returns `true` for failures that a later poll might not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ApplianceNotReady { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
                | Self::Protocol { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<powerbrain_api::Error> for CoreError {
    fn from(err: powerbrain_api::Error) -> Self {
        match err {
            powerbrain_api::Error::Network(e) => CoreError::Network {
                reason: e.to_string(),
            },
            powerbrain_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            powerbrain_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            powerbrain_api::Error::Authentication { status } => CoreError::AuthenticationFailed {
                message: format!("appliance answered HTTP {status}"),
            },
            powerbrain_api::Error::Protocol { message, body: _ } => {
                CoreError::Protocol { message }
            }
            powerbrain_api::Error::Command { command, status } => CoreError::CommandRejected {
                command: command.to_owned(),
                status,
            },
        }
    }
}
