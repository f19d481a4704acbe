// ── Device registry ──
//
// Lock-free storage of the devices known for one appliance, with push-based
// change notification via `watch` channels. Records are never pruned by a
// poll; devices the appliance stops reporting are kept and flagged stale.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, trace};

use powerbrain_api::RawDevice;

use crate::model::{DevId, DeviceKind, DeviceRecord, DeviceStatus};

/// Whether a reconcile populated an empty registry or updated a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Initial,
    Incremental,
}

/// What a single reconcile changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub outcome: ReconcileOutcome,
    /// Newly created records.
    pub added: Vec<DevId>,
    /// Known records whose status was replaced.
    pub updated: Vec<DevId>,
    /// Known records the response did not report as enabled.
    pub stale: Vec<DevId>,
    /// Entries skipped because they are disabled or duplicated.
    pub ignored: Vec<DevId>,
}

/// Devices of one appliance, keyed by [`DevId`].
pub struct DeviceRegistry {
    by_id: DashMap<DevId, Arc<DeviceRecord>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Records sorted by id, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<DeviceRecord>>>>,

    initialized: AtomicBool,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            version,
            snapshot,
            initialized: AtomicBool::new(false),
        }
    }

    /// Merge a freshly fetched device list, stamped with the current time.
    pub fn reconcile(&self, devices: Vec<RawDevice>) -> ReconcileResult {
        self.reconcile_at(devices, Utc::now())
    }

    /// Merge a freshly fetched device list.
    ///
    /// - disabled entries are never added, and do not refresh a known record;
    /// - known records present in `devices` get their status replaced as a
    ///   whole, keeping their `Arc` identity and kind;
    /// - known records missing from `devices` are kept and marked stale.
    pub fn reconcile_at(
        &self,
        devices: Vec<RawDevice>,
        fetched_at: DateTime<Utc>,
    ) -> ReconcileResult {
        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut ignored = Vec::new();
        let mut seen = HashSet::new();

        for raw in devices {
            let dev_id = DevId::from(raw.dev_id.clone());

            if !raw.device_enabled || seen.contains(&dev_id) {
                trace!(%dev_id, "ignoring device entry");
                ignored.push(dev_id);
                continue;
            }
            seen.insert(dev_id.clone());

            let existing = self.by_id.get(&dev_id).map(|r| Arc::clone(r.value()));
            match existing {
                Some(record) => {
                    if record.kind() == DeviceKind::Generic {
                        let kind = DeviceKind::classify(&raw);
                        if kind != DeviceKind::Generic && record.promote(kind) {
                            debug!(%dev_id, %kind, "generic device reclassified");
                        }
                    }
                    record.replace_status(DeviceStatus::from_raw(raw, fetched_at));
                    updated.push(dev_id);
                }
                None => {
                    let kind = DeviceKind::classify(&raw);
                    debug!(%dev_id, %kind, name = %raw.name, "new device");
                    let record = DeviceRecord::new(
                        dev_id.clone(),
                        kind,
                        DeviceStatus::from_raw(raw, fetched_at),
                    );
                    self.by_id.insert(dev_id.clone(), Arc::new(record));
                    added.push(dev_id);
                }
            }
        }

        let mut stale: Vec<DevId> = self
            .by_id
            .iter()
            .filter(|r| !seen.contains(r.key()))
            .map(|r| {
                r.value().mark_stale();
                r.key().clone()
            })
            .collect();
        stale.sort();

        let outcome = if self.initialized.swap(true, Ordering::AcqRel) {
            ReconcileOutcome::Incremental
        } else {
            ReconcileOutcome::Initial
        };

        self.rebuild_snapshot();
        self.bump_version();

        ReconcileResult {
            outcome,
            added,
            updated,
            stale,
            ignored,
        }
    }

    pub fn get(&self, dev_id: &DevId) -> Option<Arc<DeviceRecord>> {
        self.by_id.get(dev_id).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone), sorted by id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<DeviceRecord>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<DeviceRecord>>>> {
        self.snapshot.subscribe()
    }

    /// Mutation counter; bumps on every reconcile and clear.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Remove all records. Only used on teardown.
    pub fn clear(&self) {
        self.by_id.clear();
        self.initialized.store(false, Ordering::Release);
        self.rebuild_snapshot();
        self.bump_version();
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<DeviceRecord>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.dev_id().cmp(b.dev_id()));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn devices(value: Value) -> Vec<RawDevice> {
        serde_json::from_value(value).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<DevId> {
        list.iter().map(|s| DevId::from(*s)).collect()
    }

    #[test]
    fn first_reconcile_is_initial_and_skips_disabled() {
        let registry = DeviceRegistry::new();
        let result = registry.reconcile(devices(json!([
            { "dev_id": "E1", "name": "Wallbox", "device_enabled": true, "is_evse": true },
            { "dev_id": "M1", "name": "Meter", "device_enabled": true, "power": 100 },
            { "dev_id": "X1", "name": "Off", "device_enabled": false, "power": 5 }
        ])));

        assert_eq!(result.outcome, ReconcileOutcome::Initial);
        assert_eq!(result.added, ids(&["E1", "M1"]));
        assert_eq!(result.ignored, ids(&["X1"]));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&"X1".into()).is_none());
        assert_eq!(registry.get(&"E1".into()).unwrap().kind(), DeviceKind::Evse);
        assert_eq!(registry.get(&"M1".into()).unwrap().kind(), DeviceKind::Meter);
    }

    #[test]
    fn identity_survives_and_attributes_are_replaced() {
        let registry = DeviceRegistry::new();
        registry.reconcile(devices(json!([
            { "dev_id": "M1", "name": "Meter", "device_enabled": true, "power": 100, "import": 5 }
        ])));
        let before = registry.get(&"M1".into()).unwrap();

        let result = registry.reconcile(devices(json!([
            { "dev_id": "M1", "name": "Meter", "device_enabled": true, "power": 250 }
        ])));

        assert_eq!(result.outcome, ReconcileOutcome::Incremental);
        assert_eq!(result.updated, ids(&["M1"]));
        let after = registry.get(&"M1".into()).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(before.status().number("power"), Some(250.0));
        assert_eq!(before.status().attribute("import"), None);
    }

    #[test]
    fn omitted_or_disabled_devices_are_kept_stale() {
        let registry = DeviceRegistry::new();
        registry.reconcile(devices(json!([
            { "dev_id": "E1", "device_enabled": true, "is_evse": true, "state": 2 },
            { "dev_id": "M1", "device_enabled": true, "power": 1 }
        ])));

        let result = registry.reconcile(devices(json!([
            { "dev_id": "E1", "device_enabled": false, "is_evse": true, "state": 5 }
        ])));

        assert_eq!(result.stale, ids(&["E1", "M1"]));
        assert_eq!(result.ignored, ids(&["E1"]));
        assert_eq!(registry.len(), 2);

        let evse = registry.get(&"E1".into()).unwrap();
        assert!(evse.is_stale());
        assert_eq!(evse.status().integer("state"), Some(2));

        registry.reconcile(devices(json!([
            { "dev_id": "E1", "device_enabled": true, "is_evse": true, "state": 3 }
        ])));
        assert!(!evse.is_stale());
        assert_eq!(evse.status().integer("state"), Some(3));
    }

    #[test]
    fn generic_device_is_promoted_once_readings_appear() {
        let registry = DeviceRegistry::new();
        registry.reconcile(devices(json!([
            { "dev_id": "G1", "device_enabled": true, "power": null }
        ])));
        let before = registry.get(&"G1".into()).unwrap();
        assert_eq!(before.kind(), DeviceKind::Generic);

        registry.reconcile(devices(json!([
            { "dev_id": "G1", "device_enabled": true, "power": 10 }
        ])));
        let after = registry.get(&"G1".into()).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.kind(), DeviceKind::Meter);
    }

    #[test]
    fn known_kind_is_kept() {
        let registry = DeviceRegistry::new();
        registry.reconcile(devices(json!([
            { "dev_id": "M1", "device_enabled": true, "power": 10 }
        ])));
        registry.reconcile(devices(json!([
            { "dev_id": "M1", "device_enabled": true, "is_evse": true }
        ])));
        registry.reconcile(devices(json!([
            { "dev_id": "M1", "device_enabled": true }
        ])));
        assert_eq!(registry.get(&"M1".into()).unwrap().kind(), DeviceKind::Meter);
    }

    #[test]
    fn duplicate_ids_keep_the_first_entry() {
        let registry = DeviceRegistry::new();
        let result = registry.reconcile(devices(json!([
            { "dev_id": 7, "name": "first", "device_enabled": true },
            { "dev_id": "7", "name": "second", "device_enabled": true }
        ])));
        assert_eq!(result.added, ids(&["7"]));
        assert_eq!(result.ignored, ids(&["7"]));
        assert_eq!(registry.get(&"7".into()).unwrap().name(), "first");
    }

    #[test]
    fn snapshot_is_sorted_and_notifies() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();
        assert!(registry.snapshot().is_empty());

        registry.reconcile(devices(json!([
            { "dev_id": "b", "device_enabled": true },
            { "dev_id": "a", "device_enabled": true },
            { "dev_id": "c", "device_enabled": true }
        ])));

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        let order: Vec<&str> = snap.iter().map(|d| d.dev_id().as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn clear_resets_to_initial() {
        let registry = DeviceRegistry::new();
        registry.reconcile(devices(json!([{ "dev_id": "a", "device_enabled": true }])));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());

        let result =
            registry.reconcile(devices(json!([{ "dev_id": "a", "device_enabled": true }])));
        assert_eq!(result.outcome, ReconcileOutcome::Initial);
    }
}
