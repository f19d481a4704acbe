//! Polling coordination and device state for cFos Powerbrain appliances.
//!
//! This crate sits between `powerbrain-api` and a host front end (the
//! `powerbrain` CLI):
//!
//! - **[`Coordinator`]** — One per appliance. [`setup()`](Coordinator::setup)
//!   fetches the device list and validates credentials, then spawns a
//!   periodic refresh task and a command processor. Refreshes are
//!   single-flight; commands are serialized through an `mpsc` channel.
//!
//! - **[`DeviceRegistry`]** — `DashMap` + `watch` storage of
//!   [`DeviceRecord`]s. Reconciling a poll keeps record identity, swaps
//!   status in place and never prunes.
//!
//! - **[`presentation`]** — Sensor, switch and current-limit entity specs,
//!   including the rule that total-increasing readings never go backwards.
//!
//! - **[`Command`]** — Typed appliance writes.

pub mod api;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod presentation;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::ApplianceApi;
pub use command::{Command, CommandResult};
pub use config::{ApplianceConfig, DEFAULT_SCAN_INTERVAL, TlsVerification};
pub use coordinator::{Coordinator, CoordinatorState, FailureKind, RefreshOutcome};
pub use error::{CoreError, SetupFailure};
pub use store::{DeviceRegistry, ReconcileOutcome, ReconcileResult};
pub use stream::DeviceStream;

pub use model::{
    ApplianceInfo, ChargingState, DevId, DeviceKind, DeviceRecord, DeviceStatus, DeviceView,
    FirmwareVersion, MeterReading, OverrideMask,
};
