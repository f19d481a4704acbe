//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod actions;
pub mod config_cmd;
pub mod devices;
pub mod evse;
pub mod watch;

use powerbrain_core::{ApplianceConfig, Command as CoreCommand, CommandResult, Coordinator};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an appliance-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ApplianceConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(&config, args, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Evse(args) => evse::handle(&config, args, global).await,
        Command::Rfid(args) => actions::rfid(&config, args, global).await,
        Command::SetVariable(args) => actions::set_variable(&config, args, global).await,
        Command::Meter(args) => actions::meter(&config, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Connect, run one command, disconnect.
pub(crate) async fn execute_once(
    config: &ApplianceConfig,
    command: CoreCommand,
) -> Result<CommandResult, CliError> {
    tracing::debug!(command = command.name(), dev_id = ?command.dev_id(), "executing");
    let result = Coordinator::oneshot(config, |coordinator| async move {
        coordinator.execute(command).await
    })
    .await?;
    Ok(result)
}

/// Print a status line to stderr unless `--quiet`.
pub(crate) fn confirm(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("{message}");
    }
}
