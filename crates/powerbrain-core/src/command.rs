// ── Command API ──
//
// Every appliance write flows through the `Command` enum. The coordinator
// hands each one to a single processor task, so writes reach the appliance
// one at a time.

use crate::error::CoreError;
use crate::model::{DevId, MeterReading};

/// A command envelope sent through the command channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against a Powerbrain appliance.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── EVSE overrides ───────────────────────────────────────────────
    /// Limit the charging current. Sent as `round(amps * 1000)` mA.
    OverrideCurrentLimit { dev_id: DevId, amps: f64 },
    SetChargingEnabled { dev_id: DevId, enabled: bool },
    SetChargingRulesEnabled { dev_id: DevId, enabled: bool },
    SetUserRulesEnabled { dev_id: DevId, enabled: bool },

    // ── Appliance-wide ───────────────────────────────────────────────
    /// Present an RFID code. Best effort: never reports failure.
    EnterRfid { code: String, dev_id: Option<DevId> },
    /// Write a charging-manager variable.
    SetVariable { name: String, value: String },

    // ── Meters ───────────────────────────────────────────────────────
    PushMeterValues { dev_id: DevId, reading: MeterReading },
}

impl Command {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OverrideCurrentLimit { .. } => "override current limit",
            Self::SetChargingEnabled { .. } => "set charging enabled",
            Self::SetChargingRulesEnabled { .. } => "set charging rules enabled",
            Self::SetUserRulesEnabled { .. } => "set user rules enabled",
            Self::EnterRfid { .. } => "enter RFID",
            Self::SetVariable { .. } => "set variable",
            Self::PushMeterValues { .. } => "push meter values",
        }
    }

    /// The device this command targets, if any.
    pub fn dev_id(&self) -> Option<&DevId> {
        match self {
            Self::OverrideCurrentLimit { dev_id, .. }
            | Self::SetChargingEnabled { dev_id, .. }
            | Self::SetChargingRulesEnabled { dev_id, .. }
            | Self::SetUserRulesEnabled { dev_id, .. }
            | Self::PushMeterValues { dev_id, .. } => Some(dev_id),
            Self::EnterRfid { dev_id, .. } => dev_id.as_ref(),
            Self::SetVariable { .. } => None,
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// The appliance accepted the command.
    Ok,
    /// Sent without confirmation (RFID entry). Failures were logged, not raised.
    Dispatched,
}
