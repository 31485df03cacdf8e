//! Bidirectional syncer core (spec.md §4.F).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use crate::queue::RetryPolicy;

use super::transform::{TransformChain, TransformError};
use super::types::{ConflictResolution, Direction, SyncItem, SyncKey, SyncState, SyncStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("sync item {0:?} is already in flight")]
    AlreadyInFlight(SyncKey),
    #[error("transform chain error: {0}")]
    Transform(#[from] TransformError),
    #[error("manual conflict resolution required for {0:?}")]
    ManualConflict(SyncKey),
}

impl SyncError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        match self {
            Self::AlreadyInFlight(_) | Self::Transform(_) => crate::error::ErrorKind::Transient,
            Self::ManualConflict(_) => crate::error::ErrorKind::ConflictUnresolved,
        }
    }
}

struct Inner {
    items: HashMap<SyncKey, SyncItem>,
    /// Per-target in-flight set (spec.md §4.F "per-target inflight set prevents
    /// duplicate concurrent syncs").
    in_flight: HashSet<SyncKey>,
}

/// Applies placement decisions: materializes specs at targets, pulls status,
/// resolves conflicts, and reports aggregate sync health (spec.md §4.F).
pub struct SyncerCore {
    inner: Mutex<Inner>,
    transforms: TransformChain,
    conflict_resolution: ConflictResolution,
    retry_policy: RetryPolicy,
}

impl SyncerCore {
    #[must_use]
    pub fn new(transforms: TransformChain, conflict_resolution: ConflictResolution, retry_policy: RetryPolicy) -> Self {
        Self { inner: Mutex::new(Inner { items: HashMap::new(), in_flight: HashSet::new() }), transforms, conflict_resolution, retry_policy }
    }

    /// Reconciles the set of desired `(key, generation, spec)` tuples against
    /// what is currently tracked: adds missing sync items, marks stale ones
    /// `Deleting` (spec.md §4.H step 4 "add missing, delete stale").
    pub fn reconcile_targets(&self, desired: Vec<(SyncKey, u64, Value)>) {
        let mut inner = self.inner.lock().expect("syncer lock poisoned");
        let desired_keys: HashSet<SyncKey> = desired.iter().map(|(k, _, _)| k.clone()).collect();

        for (key, generation, spec) in desired {
            match inner.items.get_mut(&key) {
                Some(existing) if existing.generation != generation => {
                    existing.generation = generation;
                    existing.spec = spec;
                    existing.state = SyncState::Pending;
                }
                Some(_) => {}
                None => {
                    inner.items.insert(key.clone(), SyncItem::new(key, generation, Direction::UpToDown, spec));
                }
            }
        }

        for (key, item) in &mut inner.items {
            if !desired_keys.contains(key) && item.state != SyncState::Deleting {
                item.state = SyncState::Deleting;
            }
        }
    }

    /// Runs one sync attempt for `key`: transforms the payload through the
    /// chain in direction order, applies the configured conflict policy against
    /// `target_spec` (the target's observed current spec), and advances the
    /// item's state machine (spec.md §4.F state machine, "Conflict
    /// resolution").
    pub fn sync_one(&self, key: &SyncKey, target_spec: Option<Value>) -> Result<SyncItem, SyncError> {
        {
            let mut inner = self.inner.lock().expect("syncer lock poisoned");
            if !inner.in_flight.insert(key.clone()) {
                return Err(SyncError::AlreadyInFlight(key.clone()));
            }
        }
        let result = self.sync_one_inner(key, target_spec);
        self.inner.lock().expect("syncer lock poisoned").in_flight.remove(key);
        result
    }

    fn sync_one_inner(&self, key: &SyncKey, target_spec: Option<Value>) -> Result<SyncItem, SyncError> {
        let mut inner = self.inner.lock().expect("syncer lock poisoned");
        let item = inner.items.get_mut(key).ok_or_else(|| SyncError::AlreadyInFlight(key.clone()))?;
        item.state = SyncState::Syncing;

        let resolved = match (&target_spec, self.conflict_resolution) {
            (None, _) => item.spec.clone(),
            (Some(_), ConflictResolution::SourceWins) => item.spec.clone(),
            (Some(target), ConflictResolution::TargetWins) => merge_target_wins(&item.spec, target),
            (Some(target), ConflictResolution::Manual) if target != &item.spec => {
                item.state = SyncState::Failed;
                item.last_error = Some("Conflict".to_string());
                return Err(SyncError::ManualConflict(key.clone()));
            }
            (Some(_), ConflictResolution::Manual) => item.spec.clone(),
        };

        match self.transforms.apply_up_to_down(&key.gvr, resolved) {
            Ok(transformed) => {
                item.spec = transformed;
                item.state = SyncState::Synced;
                item.last_sync_time = Some(chrono::Utc::now());
                item.attempts = 0;
                Ok(item.clone())
            }
            Err(e) => {
                item.attempts += 1;
                item.last_error = Some(e.to_string());
                if self.retry_policy.exhausted(item.attempts) {
                    item.state = SyncState::Failed;
                } else {
                    item.state = SyncState::Pending;
                }
                Err(SyncError::Transform(e))
            }
        }
    }

    pub fn mark_deleting(&self, key: &SyncKey) {
        if let Some(item) = self.inner.lock().expect("syncer lock poisoned").items.get_mut(key) {
            item.state = SyncState::Deleting;
        }
    }

    #[must_use]
    pub fn item(&self, key: &SyncKey) -> Option<SyncItem> {
        self.inner.lock().expect("syncer lock poisoned").items.get(key).cloned()
    }

    /// Aggregate counts across all tracked sync items (spec.md §4.F "Status
    /// aggregation").
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let inner = self.inner.lock().expect("syncer lock poisoned");
        let total = inner.items.len();
        let synced = inner.items.values().filter(|i| i.state == SyncState::Synced).count();
        let failed = inner.items.values().filter(|i| i.state == SyncState::Failed).count();
        SyncStatus { total, synced, failed }
    }
}

/// `TargetWins`: fields present at target keep the target value; only fields
/// absent at target are filled in from source (spec.md §4.F).
fn merge_target_wins(source: &Value, target: &Value) -> Value {
    match (source, target) {
        (Value::Object(src), Value::Object(tgt)) => {
            let mut merged = tgt.clone();
            for (k, v) in src {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
            Value::Object(merged)
        }
        _ => target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ClusterName, WorkspaceName};
    use serde_json::json;

    fn key() -> SyncKey {
        SyncKey {
            workspace: WorkspaceName::parse("acme").unwrap(),
            gvr: super::super::types::Gvr { group: String::new(), version: "v1".into(), resource: "workloads".into() },
            namespace: None,
            name: "job-1".into(),
            target_cluster: ClusterName::parse("east-1").unwrap(),
        }
    }

    #[test]
    fn at_most_one_active_sync_item_per_key() {
        let syncer = SyncerCore::new(TransformChain::new(), ConflictResolution::SourceWins, RetryPolicy::default());
        syncer.reconcile_targets(vec![(key(), 1, json!({"replicas": 3}))]);
        syncer.inner.lock().unwrap().in_flight.insert(key());
        let err = syncer.sync_one(&key(), None);
        assert!(matches!(err, Err(SyncError::AlreadyInFlight(_))));
    }

    #[test]
    fn manual_conflict_fails_without_retry_scenario_6() {
        let syncer = SyncerCore::new(TransformChain::new(), ConflictResolution::Manual, RetryPolicy::default());
        syncer.reconcile_targets(vec![(key(), 1, json!({"replicas": 3}))]);
        let result = syncer.sync_one(&key(), Some(json!({"replicas": 5})));
        assert!(matches!(result, Err(SyncError::ManualConflict(_))));
        let item = syncer.item(&key()).unwrap();
        assert_eq!(item.state, SyncState::Failed);
        assert_eq!(item.last_error.as_deref(), Some("Conflict"));
    }

    #[test]
    fn target_wins_keeps_colliding_target_fields() {
        let syncer = SyncerCore::new(TransformChain::new(), ConflictResolution::TargetWins, RetryPolicy::default());
        syncer.reconcile_targets(vec![(key(), 1, json!({"replicas": 3, "image": "v1"}))]);
        syncer.sync_one(&key(), Some(json!({"replicas": 9}))).unwrap();
        let item = syncer.item(&key()).unwrap();
        assert_eq!(item.spec["replicas"], json!(9));
        assert_eq!(item.spec["image"], json!("v1"));
    }

    #[test]
    fn status_aggregates_synced_and_failed_counts() {
        let syncer = SyncerCore::new(TransformChain::new(), ConflictResolution::SourceWins, RetryPolicy::default());
        syncer.reconcile_targets(vec![(key(), 1, json!({}))]);
        syncer.sync_one(&key(), None).unwrap();
        let status = syncer.status();
        assert_eq!(status, SyncStatus { total: 1, synced: 1, failed: 0 });
        assert_eq!(status.health(), 1.0);
    }

    #[test]
    fn reconcile_marks_stale_targets_deleting() {
        let syncer = SyncerCore::new(TransformChain::new(), ConflictResolution::SourceWins, RetryPolicy::default());
        syncer.reconcile_targets(vec![(key(), 1, json!({}))]);
        syncer.reconcile_targets(vec![]);
        let item = syncer.item(&key()).unwrap();
        assert_eq!(item.state, SyncState::Deleting);
    }
}
