//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use powerbrain_config::ConfigError;
use powerbrain_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the appliance at {url}")]
    #[diagnostic(
        code(powerbrain::connection_failed),
        help(
            "Check that the appliance is powered and reachable.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(powerbrain::auth_failed),
        help(
            "The appliance rejected the username or password ({message}).\n\
             Run: powerbrain config set-password"
        )
    )]
    AuthFailed { message: String },

    // ── Devices ──────────────────────────────────────────────────────

    #[error("Device '{dev_id}' not found")]
    #[diagnostic(
        code(powerbrain::not_found),
        help("Run: powerbrain devices list to see available devices")
    )]
    NotFound { dev_id: String },

    #[error("'{operation}' is not supported by device '{dev_id}'")]
    #[diagnostic(
        code(powerbrain::unsupported),
        help("Device '{dev_id}' is a {kind} device.")
    )]
    Unsupported {
        operation: String,
        dev_id: String,
        kind: String,
    },

    #[error("Appliance rejected '{command}' (HTTP {status})")]
    #[diagnostic(code(powerbrain::rejected))]
    Rejected { command: String, status: u16 },

    #[error("Unexpected appliance response: {message}")]
    #[diagnostic(
        code(powerbrain::protocol),
        help("The address may not point at a Powerbrain appliance.")
    )]
    Protocol { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(powerbrain::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(powerbrain::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: powerbrain config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No appliance configured")]
    #[diagnostic(
        code(powerbrain::no_config),
        help(
            "Create a profile with: powerbrain config init\n\
             Or pass --host. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(powerbrain::config))]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(powerbrain::timeout),
        help("Increase the timeout with --timeout.")
    )]
    Timeout { seconds: u64 },

    #[error("{message}")]
    #[diagnostic(code(powerbrain::internal))]
    Internal { message: String },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ApplianceNotReady { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Network { reason } => CliError::ConnectionFailed {
                url: "(appliance)".into(),
                source: reason.into(),
            },

            CoreError::NotConnected => CliError::ConnectionFailed {
                url: "(not connected)".into(),
                source: "the coordinator is not running".into(),
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Protocol { message } => CliError::Protocol { message },

            CoreError::CommandRejected { command, status } => {
                CliError::Rejected { command, status }
            }

            CoreError::DeviceNotFound { dev_id } => CliError::NotFound { dev_id },

            CoreError::Unsupported {
                operation,
                dev_id,
                kind,
            } => CliError::Unsupported {
                operation,
                dev_id,
                kind,
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_connection_exit_codes_differ() {
        let auth = CliError::from(CoreError::AuthenticationFailed {
            message: "HTTP 401".into(),
        });
        let offline = CliError::from(CoreError::ApplianceNotReady {
            url: "http://pb".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);
        assert_eq!(offline.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn validation_maps_to_usage() {
        let err = CliError::from(CoreError::ValidationFailed {
            message: "40 A is above the maximum of 32 A".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
