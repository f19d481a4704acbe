// ── Device storage ──

pub mod registry;

pub use registry::{DeviceRegistry, ReconcileOutcome, ReconcileResult};
