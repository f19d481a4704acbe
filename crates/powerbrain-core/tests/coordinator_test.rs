#![allow(clippy::unwrap_used)]
// Coordinator tests against an in-memory appliance.
//
// Time is paused so polling intervals elapse instantly and deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use url::Url;

use powerbrain_api::{DeviceInfoResponse, Error as ApiError, MeterValues};
use powerbrain_core::{
    ApplianceApi, Command, CommandResult, Coordinator, CoordinatorState, CoreError, DevId,
    FailureKind, MeterReading, RefreshOutcome, SetupFailure,
};

// ── Fake appliance ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Failure {
    Timeout,
    Auth,
    Protocol,
    Rejected,
}

impl Failure {
    fn into_error(self, command: &'static str) -> ApiError {
        match self {
            Self::Timeout => ApiError::Timeout { timeout_secs: 5 },
            Self::Auth => ApiError::Authentication { status: 401 },
            Self::Protocol => ApiError::Protocol {
                message: "missing field `devices`".into(),
                body: String::new(),
            },
            Self::Rejected => ApiError::Command {
                command,
                status: 500,
            },
        }
    }
}

struct FakeState {
    url: Url,
    /// Scripted fetch results; the last body repeats once the script is used up.
    script: Mutex<VecDeque<Result<Value, Failure>>>,
    body: Mutex<Value>,
    auth: Mutex<Option<Failure>>,
    command_failure: Mutex<Option<Failure>>,
    fetches: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    in_command: AtomicUsize,
    max_in_command: AtomicUsize,
}

#[derive(Clone)]
struct FakeAppliance(Arc<FakeState>);

impl FakeAppliance {
    fn new(body: Value) -> Self {
        Self(Arc::new(FakeState {
            url: Url::parse("http://powerbrain.test").unwrap(),
            script: Mutex::new(VecDeque::new()),
            body: Mutex::new(body),
            auth: Mutex::new(None),
            command_failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_command: AtomicUsize::new(0),
            max_in_command: AtomicUsize::new(0),
        }))
    }

    fn push(&self, result: Result<Value, Failure>) {
        self.0.script.lock().unwrap().push_back(result);
    }

    fn set_body(&self, body: Value) {
        *self.0.body.lock().unwrap() = body;
    }

    fn fail_auth(&self, failure: Failure) {
        *self.0.auth.lock().unwrap() = Some(failure);
    }

    fn fail_commands(&self, failure: Failure) {
        *self.0.command_failure.lock().unwrap() = Some(failure);
    }

    /// Hold every fetch until permits are added to the returned semaphore.
    fn gate(&self) -> Arc<Semaphore> {
        let sem = Arc::new(Semaphore::new(0));
        *self.0.gate.lock().unwrap() = Some(Arc::clone(&sem));
        sem
    }

    fn fetches(&self) -> usize {
        self.0.fetches.load(Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<String> {
        self.0.calls.lock().unwrap().clone()
    }

    async fn command(&self, call: String, name: &'static str) -> Result<(), ApiError> {
        let now = self.0.in_command.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_in_command.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.0.calls.lock().unwrap().push(call);
        self.0.in_command.fetch_sub(1, Ordering::SeqCst);

        match *self.0.command_failure.lock().unwrap() {
            Some(failure) => Err(failure.into_error(name)),
            None => Ok(()),
        }
    }
}

impl ApplianceApi for FakeAppliance {
    fn base_url(&self) -> &Url {
        &self.0.url
    }

    async fn fetch_device_info(&self) -> Result<DeviceInfoResponse, ApiError> {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self.0.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let next = self.0.script.lock().unwrap().pop_front();
        let body = match next {
            Some(Ok(body)) => {
                self.set_body(body.clone());
                body
            }
            Some(Err(failure)) => return Err(failure.into_error("get_dev_info")),
            None => self.0.body.lock().unwrap().clone(),
        };
        serde_json::from_value(body).map_err(|e| ApiError::Protocol {
            message: e.to_string(),
            body: String::new(),
        })
    }

    async fn validate_auth(&self) -> Result<(), ApiError> {
        match *self.0.auth.lock().unwrap() {
            Some(failure) => Err(failure.into_error("validate_auth")),
            None => Ok(()),
        }
    }

    async fn override_current_limit(&self, dev_id: &str, milliamps: i64) -> Result<(), ApiError> {
        self.command(format!("mamps {dev_id} {milliamps}"), "override_device")
            .await
    }

    async fn set_charging_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), ApiError> {
        let flag = if disabled { "C" } else { "c" };
        self.command(format!("flags {dev_id} {flag}"), "override_device")
            .await
    }

    async fn set_rules_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), ApiError> {
        let flag = if disabled { "E" } else { "e" };
        self.command(format!("flags {dev_id} {flag}"), "override_device")
            .await
    }

    async fn set_user_rules_disabled(&self, dev_id: &str, disabled: bool) -> Result<(), ApiError> {
        let flag = if disabled { "U" } else { "u" };
        self.command(format!("flags {dev_id} {flag}"), "override_device")
            .await
    }

    async fn enter_rfid(&self, code: &str, dev_id: Option<&str>) -> Result<(), ApiError> {
        self.command(
            format!("rfid {code} {}", dev_id.unwrap_or("-")),
            "enter_rfid",
        )
        .await
    }

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), ApiError> {
        self.command(format!("var {name}={value}"), "set_cm_vars")
            .await
    }

    async fn post_meter_values(&self, dev_id: &str, values: &MeterValues) -> Result<(), ApiError> {
        let body = serde_json::to_string(values).unwrap();
        self.command(format!("meter {dev_id} {body}"), "set_ajax_meter")
            .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

const INTERVAL: Duration = Duration::from_secs(10);

fn body(devices: Value) -> Value {
    json!({
        "params": { "title": "Garage", "version": "1.24", "vsn": { "serialno": "4711" } },
        "devices": devices
    })
}

fn default_body() -> Value {
    body(json!([
        {
            "dev_id": "E1", "name": "Wallbox", "device_enabled": true, "is_evse": true,
            "state": 2, "overrides": 0, "total_energy": 1000,
            "min_charging_cur": 6000, "max_charging_cur": 16000
        },
        { "dev_id": "M1", "name": "Grid", "device_enabled": true, "power": 500, "import": 2000 }
    ]))
}

async fn ready(fake: &FakeAppliance) -> Coordinator<FakeAppliance> {
    let coordinator = Coordinator::new(fake.clone(), INTERVAL);
    coordinator.setup().await.unwrap();
    coordinator
}

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_setup_populates_registry() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    assert_eq!(coordinator.state(), CoordinatorState::Ready);
    assert_eq!(coordinator.devices_snapshot().len(), 2);
    assert!(coordinator.last_update().is_some());
    assert_eq!(*coordinator.subscribe_updates().borrow(), 1);

    let info = coordinator.info().unwrap();
    assert_eq!(info.title, "Garage");
    assert_eq!(info.serial_number.as_deref(), Some("4711"));

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_setup_fetch_failure_is_not_ready() {
    let fake = FakeAppliance::new(default_body());
    fake.push(Err(Failure::Timeout));

    let coordinator = Coordinator::new(fake.clone(), INTERVAL);
    let err = coordinator.setup().await.unwrap_err();

    assert!(matches!(err, CoreError::ApplianceNotReady { .. }), "got: {err:?}");
    assert_eq!(err.setup_failure(), SetupFailure::RetryLater);
    assert!(coordinator.devices_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_setup_malformed_response_is_not_ready() {
    let fake = FakeAppliance::new(json!({ "params": {} }));

    let coordinator = Coordinator::new(fake.clone(), INTERVAL);
    let err = coordinator.setup().await.unwrap_err();

    assert_eq!(err.setup_failure(), SetupFailure::RetryLater);
}

#[tokio::test(start_paused = true)]
async fn test_setup_rejected_credentials_require_reconfigure() {
    let fake = FakeAppliance::new(default_body());
    fake.fail_auth(Failure::Auth);

    let coordinator = Coordinator::new(fake.clone(), INTERVAL);
    let err = coordinator.setup().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "got: {err:?}");
    assert_eq!(err.setup_failure(), SetupFailure::Reconfigure);
    assert_eq!(coordinator.state(), CoordinatorState::Failed(FailureKind::Auth));
}

#[tokio::test(start_paused = true)]
async fn test_setup_fetch_with_rejected_credentials_requires_reconfigure() {
    let fake = FakeAppliance::new(default_body());
    fake.push(Err(Failure::Auth));

    let coordinator = Coordinator::new(fake.clone(), INTERVAL);
    let err = coordinator.setup().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "got: {err:?}");
    assert_eq!(err.setup_failure(), SetupFailure::Reconfigure);
    assert_eq!(coordinator.state(), CoordinatorState::Failed(FailureKind::Auth));
    assert!(coordinator.devices_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commands_before_setup_are_refused() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = Coordinator::new(fake.clone(), INTERVAL);

    let err = coordinator
        .execute(Command::SetVariable {
            name: "x".into(),
            value: "1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_polls_on_interval() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    assert_eq!(fake.fetches(), 1);

    tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
    assert_eq!(fake.fetches(), 2);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(fake.fetches(), 3);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_to_next_tick() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    settle().await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    coordinator.set_update_interval(Duration::from_secs(30));
    assert_eq!(coordinator.update_interval(), Duration::from_secs(30));

    // Old interval would have fired at t=10.
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(fake.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fake.fetches(), 2);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_disables_polling() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    settle().await;

    coordinator.set_update_interval(Duration::ZERO);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(fake.fetches(), 1);

    coordinator.set_update_interval(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(fake.fetches(), 2);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_keeps_registry_and_recovers() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let version = coordinator.registry().version();

    fake.push(Err(Failure::Timeout));
    fake.push(Err(Failure::Protocol));

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }));
    assert_eq!(
        coordinator.state(),
        CoordinatorState::Failed(FailureKind::Transient)
    );
    assert_eq!(coordinator.registry().version(), version);
    assert_eq!(coordinator.devices_snapshot().len(), 2);

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Protocol { .. }));
    assert_eq!(coordinator.registry().version(), version);

    let outcome = coordinator.refresh().await.unwrap();
    assert!(matches!(outcome, RefreshOutcome::Updated(_)));
    assert_eq!(coordinator.state(), CoordinatorState::Ready);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_during_polling_keeps_polling() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    fake.push(Err(Failure::Auth));
    tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
    assert_eq!(coordinator.state(), CoordinatorState::Failed(FailureKind::Auth));

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(fake.fetches(), 3);
    assert_eq!(coordinator.state(), CoordinatorState::Ready);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_is_single_flight() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = Coordinator::new(fake.clone(), Duration::ZERO);
    coordinator.setup().await.unwrap();
    assert_eq!(fake.fetches(), 1);

    let gate = fake.gate();
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.refresh().await })
    };
    while fake.fetches() < 2 {
        tokio::task::yield_now().await;
    }

    // Arrive while the first fetch is in flight.
    assert_eq!(coordinator.refresh().await.unwrap(), RefreshOutcome::Coalesced);
    assert_eq!(coordinator.refresh().await.unwrap(), RefreshOutcome::Coalesced);
    coordinator.request_refresh();

    gate.add_permits(10);
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, RefreshOutcome::Updated(_)));

    // One fetch in flight plus exactly one re-run for all coalesced callers.
    assert_eq!(fake.fetches(), 3);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_devices_survive_a_poll_that_omits_them() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let meter = coordinator.device(&DevId::from("M1")).unwrap();

    fake.push(Ok(body(json!([
        { "dev_id": "E1", "name": "Wallbox", "device_enabled": true, "is_evse": true, "state": 3 }
    ]))));
    let RefreshOutcome::Updated(result) = coordinator.refresh().await.unwrap() else {
        panic!("expected a fetch");
    };

    assert_eq!(result.stale, vec![DevId::from("M1")]);
    assert_eq!(coordinator.devices_snapshot().len(), 2);
    assert!(meter.is_stale());
    assert_eq!(meter.status().number("power"), Some(500.0));

    let evse = coordinator.device(&DevId::from("E1")).unwrap();
    assert_eq!(evse.status().integer("state"), Some(3));
    assert_eq!(evse.status().attribute("total_energy"), None);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_observers_are_notified_before_refresh_returns() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let mut updates = coordinator.subscribe_updates();
    let mut devices = coordinator.devices();
    updates.borrow_and_update();

    coordinator.refresh().await.unwrap();

    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), 2);
    let snapshot = devices.changed().await.unwrap();
    assert_eq!(snapshot.len(), 2);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_device_stream_yields_every_poll() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let mut stream = coordinator.devices().into_stream();

    let first = stream.next().await.unwrap();
    let ids: Vec<&str> = first.iter().map(|d| d.dev_id().as_str()).collect();
    assert_eq!(ids, vec!["E1", "M1"]);

    coordinator.refresh().await.unwrap();
    let second = stream.next().await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(!Arc::ptr_eq(&first, &second));

    coordinator.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_current_override_sends_milliamps_and_refreshes() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let mut updates = coordinator.subscribe_updates();
    updates.borrow_and_update();

    let result = coordinator
        .execute(Command::OverrideCurrentLimit {
            dev_id: "E1".into(),
            amps: 6.0,
        })
        .await
        .unwrap();

    assert_eq!(result, CommandResult::Ok);
    assert_eq!(fake.calls(), vec!["mamps E1 6000".to_string()]);

    updates.changed().await.unwrap();
    assert_eq!(fake.fetches(), 2);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_current_override_outside_range_is_rejected() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    for amps in [32.0, 2.0, -1.0, f64::NAN] {
        let err = coordinator
            .execute(Command::OverrideCurrentLimit {
                dev_id: "E1".into(),
                amps,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }), "{amps}: {err:?}");
    }
    assert!(fake.calls().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switch_commands_map_to_flags() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let dev_id = DevId::from("E1");

    for cmd in [
        Command::SetChargingEnabled { dev_id: dev_id.clone(), enabled: false },
        Command::SetChargingEnabled { dev_id: dev_id.clone(), enabled: true },
        Command::SetChargingRulesEnabled { dev_id: dev_id.clone(), enabled: false },
        Command::SetUserRulesEnabled { dev_id: dev_id.clone(), enabled: true },
    ] {
        coordinator.execute(cmd).await.unwrap();
    }

    assert_eq!(
        fake.calls(),
        vec!["flags E1 C", "flags E1 c", "flags E1 E", "flags E1 u"]
    );

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_capability_checks() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    let err = coordinator
        .execute(Command::SetChargingEnabled {
            dev_id: "M1".into(),
            enabled: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }), "got: {err:?}");

    let err = coordinator
        .execute(Command::PushMeterValues {
            dev_id: "E1".into(),
            reading: MeterReading::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }), "got: {err:?}");

    let err = coordinator
        .execute(Command::SetChargingEnabled {
            dev_id: "nope".into(),
            enabled: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }), "got: {err:?}");

    assert!(fake.calls().is_empty());
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_meter_push_converts_units() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    coordinator
        .execute(Command::PushMeterValues {
            dev_id: "M1".into(),
            reading: MeterReading {
                current_l1: Some(6.0),
                import_energy: Some(1.5),
                ..MeterReading::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(
        fake.calls(),
        vec![r#"meter M1 {"current":[6000,0,0],"import_wh":1500.0}"#.to_string()]
    );

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_leaves_registry_untouched() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let version = coordinator.registry().version();
    fake.fail_commands(Failure::Rejected);

    let err = coordinator
        .execute(Command::SetVariable {
            name: "solar".into(),
            value: "1".into(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::CommandRejected { status: 500, .. }), "got: {err:?}");
    settle().await;
    assert_eq!(coordinator.registry().version(), version);
    assert_eq!(fake.fetches(), 1);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rfid_failure_is_swallowed() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    fake.fail_commands(Failure::Timeout);

    let result = coordinator
        .execute(Command::EnterRfid {
            code: "0815".into(),
            dev_id: None,
        })
        .await
        .unwrap();

    assert_eq!(result, CommandResult::Dispatched);
    assert_eq!(fake.calls(), vec!["rfid 0815 -".to_string()]);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_serialized() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .execute(Command::SetVariable {
                        name: format!("v{i}"),
                        value: i.to_string(),
                    })
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fake.calls().len(), 5);
    assert_eq!(fake.0.max_in_command.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling_and_clears_registry() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;

    coordinator.shutdown().await;

    assert!(coordinator.devices_snapshot().is_empty());
    assert!(coordinator.info().is_none());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(fake.fetches(), 1);

    let err = coordinator
        .execute(Command::SetVariable {
            name: "x".into(),
            value: "1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(matches!(coordinator.setup().await, Err(CoreError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_requested_refresh() {
    let fake = FakeAppliance::new(default_body());
    let coordinator = ready(&fake).await;
    let gate = fake.gate();

    coordinator.request_refresh();
    settle().await;
    assert_eq!(fake.fetches(), 2);

    let closing = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.shutdown().await })
    };
    settle().await;
    assert!(!closing.is_finished());
    assert_eq!(coordinator.devices_snapshot().len(), 2);

    gate.add_permits(1);
    closing.await.unwrap();

    assert!(coordinator.devices_snapshot().is_empty());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(fake.fetches(), 2);
}
