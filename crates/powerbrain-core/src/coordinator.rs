// ── Appliance coordinator ──
//
// Lifecycle management for one appliance instance: setup, periodic polling
// with single-flight coalescing, serialized command routing and reactive
// observation of the device registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use powerbrain_api::{ApplianceClient, DeviceInfoResponse};

use crate::api::ApplianceApi;
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::ApplianceConfig;
use crate::error::CoreError;
use crate::model::{ApplianceInfo, DevId, DeviceKind, DeviceRecord, milliamps};
use crate::presentation::CurrentLimitSpec;
use crate::store::{DeviceRegistry, ReconcileResult};
use crate::stream::DeviceStream;

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── CoordinatorState ─────────────────────────────────────────────

/// Why the latest fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, network or malformed response; the next poll may succeed.
    Transient,
    /// Credentials rejected.
    Auth,
}

/// Polling state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Fetching,
    Ready,
    Failed(FailureKind),
}

/// Result of a [`Coordinator::refresh`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call fetched and reconciled.
    Updated(ReconcileResult),
    /// A fetch was already in flight; it will run once more on our behalf.
    Coalesced,
}

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    pending: bool,
}

// ── Coordinator ──────────────────────────────────────────────────

/// Owns the registry of one appliance and everything that touches it.
///
/// Cheaply cloneable via `Arc`. Generic over [`ApplianceApi`] so the
/// polling logic can be exercised without HTTP.
pub struct Coordinator<A: ApplianceApi = ApplianceClient> {
    inner: Arc<CoordinatorInner<A>>,
}

impl<A: ApplianceApi> Clone for Coordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<A> {
    api: A,
    registry: DeviceRegistry,
    info: ArcSwapOption<ApplianceInfo>,
    state: watch::Sender<CoordinatorState>,
    updates: watch::Sender<u64>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
    interval: watch::Sender<Duration>,
    flight: Mutex<FlightState>,
    flight_done: Notify,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: tokio::sync::Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator<ApplianceClient> {
    /// Build a coordinator for a configured appliance.
    pub fn from_config(config: &ApplianceConfig) -> Result<Self, CoreError> {
        Ok(Self::new(config.build_client()?, config.scan_interval))
    }

    /// One-shot: set up without periodic polling, run `f`, shut down.
    pub async fn oneshot<F, Fut, T>(config: &ApplianceConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let coordinator = Self::new(config.build_client()?, Duration::ZERO);
        coordinator.setup().await?;
        let result = f(coordinator.clone()).await;
        coordinator.shutdown().await;
        result
    }
}

impl<A: ApplianceApi> Coordinator<A> {
    /// Create a coordinator. Does not contact the appliance; call
    /// [`setup()`](Self::setup) for that.
    pub fn new(api: A, scan_interval: Duration) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        let (updates, _) = watch::channel(0u64);
        let (last_update, _) = watch::channel(None);
        let (interval, _) = watch::channel(scan_interval);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(CoordinatorInner {
                api,
                registry: DeviceRegistry::new(),
                info: ArcSwapOption::empty(),
                state,
                updates,
                last_update,
                interval,
                flight: Mutex::new(FlightState::default()),
                flight_done: Notify::new(),
                command_tx,
                command_rx: tokio::sync::Mutex::new(Some(command_rx)),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Fetch the device list, validate credentials and start polling.
    ///
    /// A failed fetch yields [`CoreError::ApplianceNotReady`]; rejected
    /// credentials yield [`CoreError::AuthenticationFailed`]. On success the
    /// registry holds the first snapshot and the refresh task and command
    /// processor are running.
    pub async fn setup(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }

        let url = self.inner.api.base_url().to_string();
        info!(%url, "setting up appliance");
        self.inner.state.send_replace(CoordinatorState::Fetching);

        let info = match self.inner.api.fetch_device_info().await {
            Ok(info) => info,
            Err(e) => return Err(self.setup_failed(url, &e)),
        };

        if let Err(e) = self.inner.api.validate_auth().await {
            return Err(self.setup_failed(url, &e));
        }

        let result = self.apply(info);

        let mut handles = self.inner.task_handles.lock().await;
        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let coordinator = self.clone();
            handles.push(tokio::spawn(command_processor_task(coordinator, rx)));

            let coordinator = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(refresh_task(coordinator, cancel)));
        }
        self.inner.started.store(true, Ordering::Release);

        info!(
            devices = self.inner.registry.len(),
            ignored = result.ignored.len(),
            "appliance ready"
        );
        Ok(())
    }

    /// Record a failed setup step; rejected credentials need reconfiguring,
    /// anything else is retried later.
    fn setup_failed(&self, url: String, e: &powerbrain_api::Error) -> CoreError {
        let kind = failure_kind(e);
        self.inner.state.send_replace(CoordinatorState::Failed(kind));
        match kind {
            FailureKind::Auth => {
                error!(%url, "appliance rejected credentials");
                CoreError::AuthenticationFailed {
                    message: e.to_string(),
                }
            }
            FailureKind::Transient => {
                warn!(%url, error = %e, "appliance not ready");
                CoreError::ApplianceNotReady {
                    url,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Stop background tasks and drop all device records.
    ///
    /// A fetch already in flight, scheduled or requested, is allowed to
    /// finish (bounded by the request timeout) but its result is discarded.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        loop {
            let done = self.inner.flight_done.notified();
            if !lock(&self.inner.flight).in_flight {
                break;
            }
            debug!("waiting for in-flight fetch");
            done.await;
        }

        self.inner.registry.clear();
        self.inner.info.store(None);
        self.inner.state.send_replace(CoordinatorState::Idle);
        debug!("coordinator shut down");
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Fetch and reconcile now.
    ///
    /// Single-flight: while a fetch is in flight, further calls only set a
    /// pending flag and return [`RefreshOutcome::Coalesced`]. The in-flight
    /// caller then fetches exactly once more and returns that result.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        let Some(mut guard) = FlightGuard::acquire(&self.inner.flight, &self.inner.flight_done)
        else {
            debug!("refresh coalesced into in-flight fetch");
            return Ok(RefreshOutcome::Coalesced);
        };
        // Checked after acquiring so shutdown either sees this flight or we see it.
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }

        loop {
            let result = self.fetch_once().await;
            if self.inner.cancel.is_cancelled() || !guard.take_pending() {
                return result;
            }
            debug!("refresh requested during fetch, fetching again");
        }
    }

    /// Ask for a refresh without waiting for it.
    pub fn request_refresh(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        {
            let mut flight = lock(&self.inner.flight);
            if flight.in_flight {
                flight.pending = true;
                return;
            }
        }
        let coordinator = self.clone();
        tokio::spawn(async move {
            // Failures are logged by the fetch itself.
            let _ = coordinator.refresh().await;
        });
    }

    /// Change the polling interval. The next poll fires `interval` after
    /// this call; zero disables periodic polling.
    pub fn set_update_interval(&self, interval: Duration) {
        debug!(?interval, "update interval changed");
        self.inner.interval.send_replace(interval);
    }

    pub fn update_interval(&self) -> Duration {
        *self.inner.interval.borrow()
    }

    async fn fetch_once(&self) -> Result<RefreshOutcome, CoreError> {
        self.inner.state.send_replace(CoordinatorState::Fetching);

        let fetched = self.inner.api.fetch_device_info().await;
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }

        match fetched {
            Ok(info) => Ok(RefreshOutcome::Updated(self.apply(info))),
            Err(e) => {
                let kind = failure_kind(&e);
                match &e {
                    powerbrain_api::Error::Authentication { status } => {
                        error!(status, "appliance rejected credentials during poll");
                    }
                    powerbrain_api::Error::Protocol { message, .. } => {
                        warn!(%message, "unexpected response from appliance");
                    }
                    other => warn!(error = %other, "appliance unreachable"),
                }
                self.inner.state.send_replace(CoordinatorState::Failed(kind));
                Err(e.into())
            }
        }
    }

    /// Store a successful fetch and notify observers.
    fn apply(&self, response: DeviceInfoResponse) -> ReconcileResult {
        let now = Utc::now();
        let DeviceInfoResponse { params, devices } = response;

        self.inner
            .info
            .store(Some(Arc::new(ApplianceInfo::from_params(
                &params,
                self.inner.api.base_url(),
            ))));
        let result = self.inner.registry.reconcile_at(devices, now);
        self.inner.last_update.send_replace(Some(now));
        self.inner.state.send_replace(CoordinatorState::Ready);
        self.inner.updates.send_modify(|n| *n += 1);

        debug!(
            outcome = ?result.outcome,
            added = result.added.len(),
            updated = result.updated.len(),
            stale = result.stale.len(),
            "device status refreshed"
        );
        result
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command against the appliance.
    ///
    /// Commands are handled one at a time by the command processor. On
    /// success a refresh is requested; this call does not wait for it.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if !self.inner.started.load(Ordering::Acquire) || self.inner.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::NotConnected)?;

        rx.await.map_err(|_| CoreError::NotConnected)?
    }

    async fn route_command(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let api = &self.inner.api;
        let operation = cmd.name();

        match cmd {
            Command::OverrideCurrentLimit { dev_id, amps } => {
                let record = self.require(&dev_id, DeviceKind::Evse, operation)?;
                validate_current(&record, amps)?;
                api.override_current_limit(dev_id.as_str(), milliamps(amps))
                    .await?;
            }
            Command::SetChargingEnabled { dev_id, enabled } => {
                self.require(&dev_id, DeviceKind::Evse, operation)?;
                api.set_charging_disabled(dev_id.as_str(), !enabled).await?;
            }
            Command::SetChargingRulesEnabled { dev_id, enabled } => {
                self.require(&dev_id, DeviceKind::Evse, operation)?;
                api.set_rules_disabled(dev_id.as_str(), !enabled).await?;
            }
            Command::SetUserRulesEnabled { dev_id, enabled } => {
                self.require(&dev_id, DeviceKind::Evse, operation)?;
                api.set_user_rules_disabled(dev_id.as_str(), !enabled)
                    .await?;
            }
            Command::EnterRfid { code, dev_id } => {
                if let Err(e) = api.enter_rfid(&code, dev_id.as_ref().map(DevId::as_str)).await {
                    warn!(error = %e, "RFID entry failed");
                }
                return Ok(CommandResult::Dispatched);
            }
            Command::SetVariable { name, value } => {
                api.set_variable(&name, &value).await?;
            }
            Command::PushMeterValues { dev_id, reading } => {
                self.require(&dev_id, DeviceKind::Meter, operation)?;
                api.post_meter_values(dev_id.as_str(), &reading.to_values())
                    .await?;
            }
        }
        Ok(CommandResult::Ok)
    }

    fn require(
        &self,
        dev_id: &DevId,
        kind: DeviceKind,
        operation: &str,
    ) -> Result<Arc<DeviceRecord>, CoreError> {
        let record = self
            .inner
            .registry
            .get(dev_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                dev_id: dev_id.to_string(),
            })?;
        if record.kind() == kind {
            Ok(record)
        } else {
            Err(CoreError::Unsupported {
                operation: operation.to_owned(),
                dev_id: dev_id.to_string(),
                kind: record.kind().to_string(),
            })
        }
    }

    // ── State observation ────────────────────────────────────────

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    /// Counter bumped after every successful fetch.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }

    /// Time of the last successful fetch.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_update.borrow()
    }

    pub fn info(&self) -> Option<Arc<ApplianceInfo>> {
        self.inner.info.load_full()
    }

    // ── Registry accessors ───────────────────────────────────────

    pub fn devices(&self) -> DeviceStream {
        DeviceStream::new(self.inner.registry.subscribe())
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceRecord>>> {
        self.inner.registry.snapshot()
    }

    pub fn device(&self, dev_id: &DevId) -> Option<Arc<DeviceRecord>> {
        self.inner.registry.get(dev_id)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Poll the appliance on the current interval.
///
/// The interval is re-read after every poll and whenever it changes, so a
/// new interval restarts the wait. Zero parks the task until it changes.
async fn refresh_task<A: ApplianceApi>(coordinator: Coordinator<A>, cancel: CancellationToken) {
    let mut interval_rx = coordinator.inner.interval.subscribe();

    loop {
        let period = *interval_rx.borrow_and_update();

        if period.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = tokio::time::sleep(period) => {
                // Failures are logged and reflected in the state.
                let _ = coordinator.refresh().await;
            }
        }
    }
}

/// Handle commands one at a time.
async fn command_processor_task<A: ApplianceApi>(
    coordinator: Coordinator<A>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
) {
    let cancel = coordinator.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let name = envelope.command.name();
                let dev_id = envelope.command.dev_id().cloned();
                let result = coordinator.route_command(envelope.command).await;
                match &result {
                    Ok(_) => {
                        debug!(command = name, ?dev_id, "command accepted");
                        coordinator.request_refresh();
                    }
                    Err(e) => warn!(command = name, ?dev_id, error = %e, "command failed"),
                }
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn failure_kind(err: &powerbrain_api::Error) -> FailureKind {
    if err.is_auth() {
        FailureKind::Auth
    } else {
        FailureKind::Transient
    }
}

fn lock(flight: &Mutex<FlightState>) -> MutexGuard<'_, FlightState> {
    flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reject a current limit outside what the EVSE reports it accepts.
fn validate_current(record: &DeviceRecord, amps: f64) -> Result<(), CoreError> {
    if !amps.is_finite() || amps < 0.0 {
        return Err(CoreError::ValidationFailed {
            message: format!("invalid current limit: {amps} A"),
        });
    }
    let status = record.status();
    let min = CurrentLimitSpec::min(&status);
    let max = CurrentLimitSpec::max(&status);
    if min.is_some_and(|min| amps < min) || max.is_some_and(|max| amps > max) {
        return Err(CoreError::ValidationFailed {
            message: format!(
                "current limit {amps} A outside {}..={} A",
                min.map_or_else(|| "?".to_owned(), |v| v.to_string()),
                max.map_or_else(|| "?".to_owned(), |v| v.to_string()),
            ),
        });
    }
    Ok(())
}

/// Marks a fetch as in flight for as long as it lives.
struct FlightGuard<'a> {
    flight: &'a Mutex<FlightState>,
    done: &'a Notify,
    active: bool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flight: &'a Mutex<FlightState>, done: &'a Notify) -> Option<Self> {
        let mut state = lock(flight);
        if state.in_flight {
            state.pending = true;
            return None;
        }
        state.in_flight = true;
        Some(Self {
            flight,
            done,
            active: true,
        })
    }

    /// Consume the pending flag, or end the flight if none is set.
    fn take_pending(&mut self) -> bool {
        {
            let mut state = lock(self.flight);
            if state.pending {
                state.pending = false;
                return true;
            }
            state.in_flight = false;
        }
        self.active = false;
        self.done.notify_waiters();
        false
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            {
                let mut state = lock(self.flight);
                state.in_flight = false;
                state.pending = false;
            }
            self.done.notify_waiters();
        }
    }
}
