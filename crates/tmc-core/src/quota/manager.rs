//! Quota & admission manager (spec.md §4.E).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::{Cluster, ResourceMap};
use crate::ids::WorkspaceName;

use super::types::{AllocationRequest, AllocationResult, QuotaStatus, Violation};

const DEFAULT_MAX_BURST_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("no quota set for workspace {0}")]
    UnknownWorkspace(crate::ids::WorkspaceName),
}

impl QuotaError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::Invalid
    }
}

/// Observes quota state transitions. Per spec.md §4.E / §9, callbacks are invoked
/// **synchronously while the manager's lock is held** — implementations must not
/// re-enter [`QuotaManager`] from within a callback, on pain of deadlock.
pub trait QuotaListener: Send + Sync {
    fn on_quota_violation(&self, _workspace: &WorkspaceName, _violations: &[Violation]) {}
    fn on_allocation_denied(&self, _workspace: &WorkspaceName, _request: &AllocationRequest, _reason: &str) {}
}

#[derive(Debug, Clone, Default)]
struct WorkspaceLedger {
    hard: ResourceMap,
    used: ResourceMap,
    burst_allowed: bool,
}

impl WorkspaceLedger {
    fn status(&self) -> QuotaStatus {
        let utilization = self
            .hard
            .iter()
            .map(|(k, hard)| {
                let used = self.used.get(k).copied().unwrap_or(0.0);
                let pct = if *hard > 0.0 { (used / hard * 100.0).min(100.0) } else { 0.0 };
                (k.clone(), pct)
            })
            .collect();
        let violations = self.violations();
        QuotaStatus { hard: self.hard.clone(), used: self.used.clone(), utilization, violations, burst_allowed: self.burst_allowed }
    }

    fn violations(&self) -> Vec<Violation> {
        if self.burst_allowed {
            return Vec::new();
        }
        self.hard
            .iter()
            .filter_map(|(k, hard)| {
                let used = self.used.get(k).copied().unwrap_or(0.0);
                (used > *hard).then(|| Violation { resource: k.clone(), hard: *hard, used })
            })
            .collect()
    }

    fn effective_hard(&self, allow_burst: bool, multiplier: f64) -> ResourceMap {
        if allow_burst && self.burst_allowed {
            self.hard.iter().map(|(k, v)| (k.clone(), v * multiplier)).collect()
        } else {
            self.hard.clone()
        }
    }
}

/// Hierarchical usage/limit accounting for workspaces, gating allocations before
/// the placement/syncer pipeline materializes them (spec.md §4.E).
pub struct QuotaManager {
    ledgers: Mutex<HashMap<WorkspaceName, WorkspaceLedger>>,
    listeners: RwLock<Vec<Arc<dyn QuotaListener>>>,
    max_burst_multiplier: f64,
    active_violations: AtomicU64,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BURST_MULTIPLIER)
    }
}

impl QuotaManager {
    #[must_use]
    pub fn new(max_burst_multiplier: f64) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            max_burst_multiplier,
            active_violations: AtomicU64::new(0),
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn QuotaListener>) {
        self.listeners.write().expect("quota listeners lock poisoned").push(listener);
    }

    /// Replaces a workspace's hard limits, recomputing utilization and violations.
    pub fn set_workspace_quota(&self, workspace: WorkspaceName, hard: ResourceMap, burst_allowed: bool) {
        let mut ledgers = self.ledgers.lock().expect("quota ledger lock poisoned");
        let ledger = ledgers.entry(workspace.clone()).or_default();
        ledger.hard = hard;
        ledger.burst_allowed = burst_allowed;
        let violations = ledger.violations();
        drop(ledgers);
        self.notify_violations(&workspace, &violations);
    }

    /// Atomically swaps a workspace's recorded usage, recomputing violations.
    pub fn update_workspace_usage(&self, workspace: &WorkspaceName, used: ResourceMap) -> Result<(), QuotaError> {
        let violations = {
            let mut ledgers = self.ledgers.lock().expect("quota ledger lock poisoned");
            let ledger = ledgers.get_mut(workspace).ok_or_else(|| QuotaError::UnknownWorkspace(workspace.clone()))?;
            ledger.used = used;
            ledger.violations()
        };
        self.notify_violations(workspace, &violations);
        Ok(())
    }

    #[must_use]
    pub fn status(&self, workspace: &WorkspaceName) -> Option<QuotaStatus> {
        self.ledgers.lock().expect("quota ledger lock poisoned").get(workspace).map(WorkspaceLedger::status)
    }

    /// Admits or denies an allocation request against `request ∪ used ≤ hard`
    /// (or `hard · maxBurstMultiplier` when burst applies). On approval, the
    /// requested amounts are folded into `used` — the manager's allocation
    /// ledger is the source of truth for `allocated = Σ(assignments)`.
    pub fn request_allocation(&self, request: &AllocationRequest) -> AllocationResult {
        let mut ledgers = self.ledgers.lock().expect("quota ledger lock poisoned");
        let ledger = ledgers.entry(request.workspace.clone()).or_default();
        let effective_hard = ledger.effective_hard(request.allow_burst, self.max_burst_multiplier);

        let fits = request.requested.iter().all(|(resource, qty)| {
            let used = ledger.used.get(resource).copied().unwrap_or(0.0);
            let hard = effective_hard.get(resource).copied().unwrap_or(0.0);
            used + qty <= hard
        });

        if !fits {
            let reason = "Request would exceed quota limits".to_string();
            drop(ledgers);
            self.notify_denial(&request.workspace, request, &reason);
            return AllocationResult { approved: false, allocated: ResourceMap::new(), reason: Some(reason) };
        }

        for (resource, qty) in &request.requested {
            *ledger.used.entry(resource.clone()).or_insert(0.0) += qty;
        }
        AllocationResult { approved: true, allocated: request.requested.clone(), reason: None }
    }

    fn notify_violations(&self, workspace: &WorkspaceName, violations: &[Violation]) {
        if violations.is_empty() {
            return;
        }
        warn!(workspace = %workspace, count = violations.len(), "quota violation detected");
        let listeners = self.listeners.read().expect("quota listeners lock poisoned");
        for listener in listeners.iter() {
            listener.on_quota_violation(workspace, violations);
        }
    }

    fn notify_denial(&self, workspace: &WorkspaceName, request: &AllocationRequest, reason: &str) {
        let listeners = self.listeners.read().expect("quota listeners lock poisoned");
        for listener in listeners.iter() {
            listener.on_allocation_denied(workspace, request, reason);
        }
    }

    /// Picks the healthy cluster with the lowest average resource utilization
    /// that still satisfies `requested` (spec.md §4.E "Cluster selection within
    /// quota", `FairShare`).
    #[must_use]
    pub fn fair_share_cluster<'a>(&self, clusters: &'a [Cluster], requested: &ResourceMap) -> Option<&'a Cluster> {
        let mut candidates: Vec<&Cluster> = clusters.iter().filter(|c| c.healthy && c.fits(requested)).collect();
        candidates.sort_by(|a, b| {
            a.average_utilization()
                .partial_cmp(&b.average_utilization())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });
        candidates.into_iter().next()
    }

    /// First healthy cluster (in iteration order) that fits `requested`
    /// (spec.md §4.E, `FirstFit`).
    #[must_use]
    pub fn first_fit_cluster<'a>(&self, clusters: &'a [Cluster], requested: &ResourceMap) -> Option<&'a Cluster> {
        clusters.iter().find(|c| c.healthy && c.fits(requested))
    }

    /// Healthy cluster minimizing unused slack `Σ(available−requested)` across
    /// resources (spec.md §4.E, `BestFit`).
    #[must_use]
    pub fn best_fit_cluster<'a>(&self, clusters: &'a [Cluster], requested: &ResourceMap) -> Option<&'a Cluster> {
        clusters
            .iter()
            .filter(|c| c.healthy && c.fits(requested))
            .min_by(|a, b| a.slack(requested).partial_cmp(&b.slack(requested)).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.name.as_str().cmp(b.name.as_str())))
    }

    /// Periodic usage-aggregation loop (spec.md §4.E "every `aggregationInterval`
    /// (default 30s)"). Re-derives each workspace's status from the manager's own
    /// allocation ledger and logs a summary; does not fetch external data, since
    /// the ledger itself is the source of truth for `used`.
    pub async fn run_aggregation_loop(&self, interval: Duration, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ledgers = self.ledgers.lock().expect("quota ledger lock poisoned");
                    debug!(workspaces = ledgers.len(), "quota usage aggregation tick");
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Periodic violation-scan loop (spec.md §4.E "every minute updates
    /// `ActiveViolations` metric").
    pub async fn run_violation_scan_loop(&self, interval: Duration, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.scan_violations(),
                _ = shutdown.recv() => break,
            }
        }
    }

    fn scan_violations(&self) {
        let ledgers = self.ledgers.lock().expect("quota ledger lock poisoned");
        let total: u64 = ledgers.values().map(|l| l.violations().len() as u64).sum();
        self.active_violations.store(total, Ordering::Relaxed);
    }

    #[must_use]
    pub fn active_violations(&self) -> u64 {
        self.active_violations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClusterName;
    use std::sync::atomic::AtomicUsize;

    fn ws(name: &str) -> WorkspaceName {
        WorkspaceName::parse(name).unwrap()
    }

    fn resources(pairs: &[(&str, f64)]) -> ResourceMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn quota_exceeded_scenario_3() {
        let manager = QuotaManager::default();
        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), false);
        manager.update_workspace_usage(&ws("acme"), resources(&[("cpu", 900.0)])).unwrap();

        let result = manager.request_allocation(&AllocationRequest {
            workspace: ws("acme"),
            requested: resources(&[("cpu", 200.0)]),
            allow_burst: false,
        });

        assert!(!result.approved);
        assert_eq!(result.reason.as_deref(), Some("Request would exceed quota limits"));
    }

    #[test]
    fn burst_allowed_scenario_4() {
        let manager = QuotaManager::default();
        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), true);
        manager.update_workspace_usage(&ws("acme"), resources(&[("cpu", 900.0)])).unwrap();

        let result = manager.request_allocation(&AllocationRequest {
            workspace: ws("acme"),
            requested: resources(&[("cpu", 200.0)]),
            allow_burst: true,
        });

        assert!(result.approved, "900 + 200 = 1100 <= 1000 * 1.5 = 1500");
    }

    #[test]
    fn approved_allocation_accumulates_into_used() {
        let manager = QuotaManager::default();
        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), false);
        manager.request_allocation(&AllocationRequest { workspace: ws("acme"), requested: resources(&[("cpu", 300.0)]), allow_burst: false });
        manager.request_allocation(&AllocationRequest { workspace: ws("acme"), requested: resources(&[("cpu", 300.0)]), allow_burst: false });
        let status = manager.status(&ws("acme")).unwrap();
        assert_eq!(status.used.get("cpu"), Some(&600.0));
    }

    #[test]
    fn violation_exists_only_without_burst_allowance() {
        let manager = QuotaManager::default();
        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), false);
        manager.update_workspace_usage(&ws("acme"), resources(&[("cpu", 1200.0)])).unwrap();
        let status = manager.status(&ws("acme")).unwrap();
        assert_eq!(status.violations.len(), 1);

        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), true);
        manager.update_workspace_usage(&ws("acme"), resources(&[("cpu", 1200.0)])).unwrap();
        let status = manager.status(&ws("acme")).unwrap();
        assert!(status.violations.is_empty());
    }

    struct CountingListener(AtomicUsize);

    impl QuotaListener for CountingListener {
        fn on_quota_violation(&self, _workspace: &WorkspaceName, _violations: &[Violation]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn listener_is_invoked_on_violation() {
        let manager = QuotaManager::default();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        manager.register_listener(listener.clone());
        manager.set_workspace_quota(ws("acme"), resources(&[("cpu", 1000.0)]), false);
        manager.update_workspace_usage(&ws("acme"), resources(&[("cpu", 1500.0)])).unwrap();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fair_share_picks_least_utilized_fitting_cluster() {
        let manager = QuotaManager::default();
        let mut a = Cluster::new(ClusterName::parse("a").unwrap(), "us");
        a.capacity.insert("cpu".into(), 1000.0);
        a.allocated.insert("cpu".into(), 900.0);
        a.recompute_available();
        let mut b = Cluster::new(ClusterName::parse("b").unwrap(), "us");
        b.capacity.insert("cpu".into(), 1000.0);
        b.allocated.insert("cpu".into(), 100.0);
        b.recompute_available();

        let clusters = [a, b];
        let chosen = manager.fair_share_cluster(&clusters, &resources(&[("cpu", 50.0)])).unwrap();
        assert_eq!(chosen.name.as_str(), "b");
    }
}
