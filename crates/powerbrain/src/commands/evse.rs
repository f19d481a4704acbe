//! Wallbox command handlers.

use powerbrain_core::presentation::{
    CHARGING_SWITCH, CurrentLimitSpec, RULES_SWITCH, SwitchSpec, USER_RULES_SWITCH,
};
use powerbrain_core::{ApplianceConfig, DevId};

use crate::cli::{EvseArgs, EvseCommand, GlobalOpts, Toggle};
use crate::error::CliError;

use super::{confirm, execute_once};

pub async fn handle(
    config: &ApplianceConfig,
    args: EvseArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        EvseCommand::Current { dev_id, amps } => {
            let command = CurrentLimitSpec::command(DevId::from(dev_id.as_str()), amps);
            execute_once(config, command).await?;
            confirm(global, &format!("Current limit of {dev_id} set to {amps} A"));
            Ok(())
        }
        EvseCommand::Charging { dev_id, state } => {
            toggle(config, global, &CHARGING_SWITCH, &dev_id, state).await
        }
        EvseCommand::Rules { dev_id, state } => {
            toggle(config, global, &RULES_SWITCH, &dev_id, state).await
        }
        EvseCommand::UserRules { dev_id, state } => {
            toggle(config, global, &USER_RULES_SWITCH, &dev_id, state).await
        }
    }
}

async fn toggle(
    config: &ApplianceConfig,
    global: &GlobalOpts,
    switch: &SwitchSpec,
    dev_id: &str,
    state: Toggle,
) -> Result<(), CliError> {
    execute_once(config, switch.command(DevId::from(dev_id), state.enabled())).await?;
    let shown = if state.enabled() { "on" } else { "off" };
    confirm(global, &format!("{} on {dev_id}: {shown}", switch.name));
    Ok(())
}
