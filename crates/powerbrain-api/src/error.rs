use thiserror::Error;

/// Top-level error type for the `powerbrain-api` crate.
///
/// Every variant is a raised condition; the caller decides whether it is
/// recoverable. `powerbrain-core` maps these into setup and polling outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request did not complete within the per-call timeout.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Authentication ──────────────────────────────────────────────
    /// The appliance rejected the configured credentials.
    #[error("Authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// The response was not the JSON shape the appliance normally returns.
    #[error("Unexpected response: {message}")]
    Protocol { message: String, body: String },

    // ── Commands ────────────────────────────────────────────────────
    /// A write command was rejected by the appliance.
    #[error("Command '{command}' rejected (HTTP {status})")]
    Command { command: &'static str, status: u16 },
}

impl Error {
    /// Map a `reqwest` error, folding timeouts into [`Error::Timeout`].
    pub(crate) fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Network(err)
        }
    }

    /// Returns `true` if the next poll might succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::Protocol { .. }
        )
    }

    /// Returns `true` if the appliance could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
