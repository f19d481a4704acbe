// ── Domain model ──
//
// Canonical types for one appliance and the devices it manages. Built
// from `powerbrain-api` wire models; consumers (CLI, presentation layer)
// only ever see these.

pub mod appliance;
pub mod device;
pub mod meter;

pub use appliance::{ApplianceInfo, FirmwareVersion};
pub use device::{
    ChargingState, DevId, DeviceKind, DeviceRecord, DeviceStatus, DeviceView, OverrideMask,
};
pub use meter::{MeterReading, milliamps};
