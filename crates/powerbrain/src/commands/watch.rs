//! `watch`: run the coordinator and print entity changes until Ctrl-C.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use powerbrain_core::presentation::{DeviceEntities, DisplayValue, EntityValue};
use powerbrain_core::{
    ApplianceConfig, ApplianceInfo, Coordinator, CoordinatorState, DevId, DeviceRecord,
    FailureKind,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One printed line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    Entity {
        at: DateTime<Utc>,
        dev_id: DevId,
        device: String,
        #[serde(flatten)]
        entity: EntityValue,
    },
    Stale {
        at: DateTime<Utc>,
        dev_id: DevId,
        device: String,
    },
}

/// Entity state carried between polls; emits only what changed.
#[derive(Default)]
struct EntityTracker {
    filter: Option<DevId>,
    devices: HashMap<DevId, DeviceEntities>,
    last: HashMap<String, Option<DisplayValue>>,
    stale: HashSet<DevId>,
}

impl EntityTracker {
    fn new(filter: Option<DevId>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    fn changes(
        &mut self,
        info: &ApplianceInfo,
        snapshot: &[Arc<DeviceRecord>],
        at: DateTime<Utc>,
    ) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        for record in snapshot {
            let dev_id = record.dev_id();
            if self.filter.as_ref().is_some_and(|f| f != dev_id) {
                continue;
            }

            if record.is_stale() {
                if self.stale.insert(dev_id.clone()) {
                    events.push(WatchEvent::Stale {
                        at,
                        dev_id: dev_id.clone(),
                        device: record.name(),
                    });
                }
                continue;
            }
            self.stale.remove(dev_id);

            let entities = self
                .devices
                .entry(dev_id.clone())
                .and_modify(|entities| {
                    // A generic device gains entities once it is reclassified.
                    if entities.kind != record.kind() {
                        *entities = DeviceEntities::new(info, record);
                    }
                })
                .or_insert_with(|| DeviceEntities::new(info, record));
            let status = record.status();
            for entity in entities.update(&status) {
                let previous = self.last.insert(entity.unique_id.clone(), entity.value.clone());
                if previous.as_ref() == Some(&entity.value) {
                    continue;
                }
                events.push(WatchEvent::Entity {
                    at,
                    dev_id: dev_id.clone(),
                    device: status.name.clone(),
                    entity,
                });
            }
        }
        events
    }
}

fn format_event(event: &WatchEvent, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event).trim_end()),
        OutputFormat::Table | OutputFormat::Plain => match event {
            WatchEvent::Entity {
                at, device, entity, ..
            } => {
                let value = entity
                    .value
                    .as_ref()
                    .map_or_else(|| "-".to_owned(), ToString::to_string);
                let unit = entity.unit.map(|u| format!(" {u}")).unwrap_or_default();
                format!(
                    "{}  {device} / {}: {}{unit}",
                    at.format("%H:%M:%S"),
                    entity.name,
                    output::paint(&value, color),
                )
            }
            WatchEvent::Stale { at, device, .. } => format!(
                "{}  {device}: {}",
                at.format("%H:%M:%S"),
                output::paint("stale", color)
            ),
        },
    }
}

pub async fn handle(
    mut config: ApplianceConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(secs) = args.interval {
        config.scan_interval = Duration::from_secs(secs);
    }
    if config.scan_interval.is_zero() {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "watch needs a poll interval above zero".into(),
        });
    }

    let coordinator = Coordinator::from_config(&config)?;
    coordinator.setup().await?;
    info!(url = %config.url, interval = ?config.scan_interval, "watching appliance");

    let color = output::should_color(&global.color);
    let mut tracker = EntityTracker::new(args.dev_id.map(DevId::from));
    // Yields the current snapshot first, then one per successful poll.
    let mut devices = coordinator.devices().into_stream();
    let mut states = coordinator.subscribe_state();
    let mut failed: Option<FailureKind> = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("interrupted");
                break;
            }

            snapshot = devices.next() => {
                let Some(snapshot) = snapshot else { break };
                emit(&coordinator, &snapshot, &mut tracker, global, color);
            }

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                report_state(state, &mut failed, global);
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

fn emit(
    coordinator: &Coordinator,
    snapshot: &[Arc<DeviceRecord>],
    tracker: &mut EntityTracker,
    global: &GlobalOpts,
    color: bool,
) {
    let Some(info) = coordinator.info() else {
        return;
    };
    let at = coordinator.last_update().unwrap_or_else(Utc::now);
    for event in tracker.changes(&info, snapshot, at) {
        output::print_output(&format_event(&event, &global.output, color), global.quiet);
    }
}

fn report_state(state: CoordinatorState, failed: &mut Option<FailureKind>, global: &GlobalOpts) {
    match state {
        CoordinatorState::Failed(kind) if *failed != Some(kind) => {
            *failed = Some(kind);
            if !global.quiet {
                match kind {
                    FailureKind::Auth => {
                        eprintln!("appliance rejected the credentials; still polling");
                    }
                    FailureKind::Transient => {
                        eprintln!("appliance unavailable; keeping last known values");
                    }
                }
            }
        }
        CoordinatorState::Ready => {
            if failed.take().is_some() && !global.quiet {
                eprintln!("appliance available again");
            }
        }
        _ => {}
    }
}
