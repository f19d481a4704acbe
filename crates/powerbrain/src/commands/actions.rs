//! Appliance-wide actions: RFID entry, variables, meter pushes.

use powerbrain_core::{ApplianceConfig, Command as CoreCommand, DevId, MeterReading};

use crate::cli::{GlobalOpts, MeterArgs, MeterCommand, MeterPushArgs, RfidArgs, SetVariableArgs};
use crate::error::CliError;

use super::{confirm, execute_once};

pub async fn rfid(
    config: &ApplianceConfig,
    args: RfidArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    execute_once(
        config,
        CoreCommand::EnterRfid {
            code: args.code,
            dev_id: args.dev_id.map(DevId::from),
        },
    )
    .await?;
    confirm(global, "RFID code sent");
    Ok(())
}

pub async fn set_variable(
    config: &ApplianceConfig,
    args: SetVariableArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let message = format!("Variable {} set to {}", args.name, args.value);
    execute_once(
        config,
        CoreCommand::SetVariable {
            name: args.name,
            value: args.value,
        },
    )
    .await?;
    confirm(global, &message);
    Ok(())
}

pub async fn meter(
    config: &ApplianceConfig,
    args: MeterArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        MeterCommand::Push(push) => {
            let dev_id = DevId::from(push.dev_id.as_str());
            let reading = reading_from_args(&push)?;
            execute_once(config, CoreCommand::PushMeterValues { dev_id, reading }).await?;
            confirm(global, &format!("Meter values sent to {}", push.dev_id));
            Ok(())
        }
    }
}

fn reading_from_args(args: &MeterPushArgs) -> Result<MeterReading, CliError> {
    let reading = MeterReading {
        power: args.power,
        is_va: args.is_va.then_some(true),
        voltage_l1: args.voltage_l1,
        voltage_l2: args.voltage_l2,
        voltage_l3: args.voltage_l3,
        current_l1: args.current_l1,
        current_l2: args.current_l2,
        current_l3: args.current_l3,
        import_energy: args.import_energy,
        export_energy: args.export_energy,
    };
    if reading.is_empty() {
        return Err(CliError::Validation {
            field: "meter values".into(),
            reason: "pass at least one of --power, --voltage-l1, --current-l1, \
                     --import-energy or --export-energy"
                .into(),
        });
    }
    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(dev_id: &str) -> MeterPushArgs {
        MeterPushArgs {
            dev_id: dev_id.into(),
            power: None,
            is_va: false,
            voltage_l1: None,
            voltage_l2: None,
            voltage_l3: None,
            current_l1: None,
            current_l2: None,
            current_l3: None,
            import_energy: None,
            export_energy: None,
        }
    }

    #[test]
    fn empty_push_is_rejected() {
        assert!(matches!(
            reading_from_args(&push("M2")),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn is_va_only_set_when_flagged() {
        let mut args = push("M2");
        args.power = Some(-1500.0);
        let reading = reading_from_args(&args).unwrap_or_default();
        assert_eq!(reading.power, Some(-1500.0));
        assert_eq!(reading.is_va, None);

        args.is_va = true;
        let reading = reading_from_args(&args).unwrap_or_default();
        assert_eq!(reading.is_va, Some(true));
    }
}
