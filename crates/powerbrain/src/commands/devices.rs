//! Device command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use powerbrain_core::presentation::{DeviceDescriptor, DeviceEntities, EntityValue};
use powerbrain_core::{
    ApplianceConfig, ChargingState, Coordinator, CoreError, DevId, DeviceKind, DeviceView,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Power")]
    power: String,
}

impl DeviceRow {
    fn new(d: &DeviceView, color: bool) -> Self {
        let (power_key, unit) = match d.kind {
            DeviceKind::Evse => ("cur_charging_power", "W"),
            _ if d.attributes.get("is_va").and_then(serde_json::Value::as_bool) == Some(true) => {
                ("power", "VA")
            }
            _ => ("power", "W"),
        };
        let state = match d.kind {
            DeviceKind::Evse => d
                .attributes
                .get("state")
                .and_then(serde_json::Value::as_i64)
                .map_or_else(|| "-".into(), |c| ChargingState::from_code(c).to_string()),
            _ => "-".into(),
        };
        Self {
            id: d.dev_id.to_string(),
            name: d.name.clone(),
            kind: d.kind.to_string(),
            model: d
                .attributes
                .get("model")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("-")
                .to_owned(),
            state: if d.stale {
                output::paint("stale", color)
            } else {
                output::paint(&state, color)
            },
            power: d
                .attributes
                .get(power_key)
                .and_then(serde_json::Value::as_f64)
                .map_or_else(|| "-".into(), |p| format!("{p} {unit}")),
        }
    }
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    name: String,
    #[tabled(rename = "Type")]
    platform: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unique ID")]
    unique_id: String,
}

impl EntityRow {
    fn new(e: &EntityValue, color: bool) -> Self {
        let value = e.value.as_ref().map_or_else(
            || "-".to_owned(),
            |v| match e.unit {
                Some(unit) => format!("{v} {unit}"),
                None => v.to_string(),
            },
        );
        Self {
            name: e.name.to_owned(),
            platform: e.platform.to_string(),
            value: output::paint(&value, color),
            unique_id: e.unique_id.clone(),
        }
    }
}

/// `devices show` payload.
#[derive(Debug, Serialize)]
struct DeviceDetail {
    device: DeviceView,
    descriptor: DeviceDescriptor,
    entities: Vec<EntityValue>,
}

fn detail(d: &DeviceDetail, color: bool) -> String {
    let mut lines = vec![
        format!("ID:           {}", d.device.dev_id),
        format!("Name:         {}", d.device.name),
        format!("Kind:         {}", d.device.kind),
        format!("Manufacturer: {}", d.descriptor.manufacturer),
        format!("Model:        {}", d.descriptor.model.as_deref().unwrap_or("-")),
        format!("Identifier:   {}", d.descriptor.identifier),
        format!("Config URL:   {}", d.descriptor.configuration_url),
        format!(
            "Updated:      {}",
            d.device.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ];
    if d.device.stale {
        lines.push(format!(
            "Status:       {} (not in the latest poll)",
            output::paint("stale", color)
        ));
    }
    if !d.entities.is_empty() {
        let rows: Vec<EntityRow> = d.entities.iter().map(|e| EntityRow::new(e, color)).collect();
        lines.push(String::new());
        lines.push(output::render_table(&rows));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: &ApplianceConfig,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        DevicesCommand::List => {
            let views = Coordinator::oneshot(config, |coordinator| async move {
                Ok(coordinator
                    .devices_snapshot()
                    .iter()
                    .map(|d| d.view())
                    .collect::<Vec<_>>())
            })
            .await?;

            let out = output::render_list(
                &global.output,
                &views,
                |d| DeviceRow::new(d, color),
                |d| d.dev_id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Show { dev_id } => {
            let dev_id = DevId::from(dev_id);
            let found = Coordinator::oneshot(config, |coordinator| async move {
                let info = coordinator.info().ok_or_else(|| {
                    CoreError::Internal("appliance info missing after setup".into())
                })?;
                let record = coordinator
                    .device(&dev_id)
                    .ok_or_else(|| CoreError::DeviceNotFound {
                        dev_id: dev_id.to_string(),
                    })?;
                Ok(describe(&info, &record))
            })
            .await?;

            let out = output::render_single(
                &global.output,
                &found,
                |d| detail(d, color),
                |d| {
                    d.entities
                        .iter()
                        .map(|e| {
                            let value = e.value.as_ref().map(ToString::to_string);
                            format!("{}={}", e.unique_id, value.as_deref().unwrap_or(""))
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

fn describe(
    info: &powerbrain_core::ApplianceInfo,
    record: &Arc<powerbrain_core::DeviceRecord>,
) -> DeviceDetail {
    let mut entities = DeviceEntities::new(info, record);
    DeviceDetail {
        device: record.view(),
        entities: entities.update(&record.status()),
        descriptor: entities.descriptor,
    }
}
