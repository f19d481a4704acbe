// powerbrain-api: Async Rust client for the cFos Powerbrain HTTP API

pub mod auth;
pub mod client;
mod commands;
pub mod error;
pub mod models;
mod status;
pub mod transport;

pub use auth::BasicAuth;
pub use client::ApplianceClient;
pub use error::Error;
pub use models::{ApplianceParams, DeviceInfoResponse, MeterValues, OverrideFlag, RawDevice, Vsn};
pub use transport::{TlsMode, TransportConfig};
