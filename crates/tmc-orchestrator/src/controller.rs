//! Reconcile controller (spec.md §4.H): binds A–G per placement object.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tmc_core::cluster::ResourceMap;
use tmc_core::events::{Event, EventType};
use tmc_core::external::{Condition, ConditionReason, ConditionType, PlacementStatus, PlacementStoreError};
use tmc_core::ids::{PlacementId, WorkspaceName};
use tmc_core::queue::{Priority, QueueError, RetryPolicy, WorkItem};
use tmc_core::quota::AllocationRequest;
use tmc_core::sync::{Gvr, SyncError, SyncKey};

use crate::services::CoreServices;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("work queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("placement error: {0}")]
    Placement(#[from] tmc_core::placement::PlacementError),

    #[error("quota denied: {0}")]
    QuotaDenied(String),

    #[error("placement store error: {0}")]
    Store(#[from] PlacementStoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl ReconcileError {
    #[must_use]
    pub const fn kind(&self) -> tmc_core::error::ErrorKind {
        match self {
            Self::Queue(e) => e.kind(),
            Self::Placement(e) => e.kind(),
            Self::QuotaDenied(_) => tmc_core::error::ErrorKind::QuotaExceeded,
            Self::Store(PlacementStoreError::Conflict(_)) => tmc_core::error::ErrorKind::Conflict,
            Self::Store(PlacementStoreError::NotFound(_)) => tmc_core::error::ErrorKind::Invalid,
            Self::Sync(e) => e.kind(),
        }
    }
}

/// Binds A–G per placement object and drives a fixed-size worker pool
/// (spec.md §5 "Scheduling model").
pub struct ReconcileController {
    services: CoreServices,
    worker_count: usize,
    retry_policy: RetryPolicy,
    /// Last status this controller wrote per placement, since the controller
    /// exclusively owns placement decisions (spec.md §3 "Ownership") and the
    /// external store exposes no read-back of status, only spec.
    observed: Mutex<HashMap<PlacementId, PlacementStatus>>,
}

impl ReconcileController {
    #[must_use]
    pub fn new(services: CoreServices, worker_count: usize, retry_policy: RetryPolicy) -> Self {
        Self { services, worker_count, retry_policy, observed: Mutex::new(HashMap::new()) }
    }

    /// Enqueues a reconcile key for `id` at `priority` (spec.md §4.A `Add`).
    pub fn enqueue(&self, id: &PlacementId, workspace: WorkspaceName, priority: Priority) -> Result<(), QueueError> {
        let item = WorkItem::new("placement", workspace, id.as_str(), priority);
        self.services.queue.add_with_priority(item, Some(priority))
    }

    /// Runs `worker_count` workers to completion of the shutdown signal,
    /// joining when all have drained (spec.md §5 "worker pool ... pulls from
    /// 4.A concurrently; each runs one reconciliation to completion before
    /// calling `Done`").
    pub async fn run(self: std::sync::Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let controller = std::sync::Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        item = controller.services.queue.get() => {
                            let Some(item) = item else {
                                tracing::info!(worker_id, "queue shut down, worker exiting");
                                break;
                            };
                            controller.process(item).await;
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                tracing::info!(worker_id, "shutdown signal received, worker exiting");
                                break;
                            }
                        }
                    }
                }
            }));
        }
        shutdown.changed().await.ok();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn process(&self, item: WorkItem) {
        let key = item.key.clone();
        let Some(id) = placement_id_from_key(&key) else {
            tracing::warn!(key = %key, "work item key is not a placement key, dropping");
            self.services.queue.done(&item);
            return;
        };
        match self.reconcile_one(&id, &item).await {
            Ok(()) => self.services.queue.done(&item),
            Err(err) => self.handle_failure(&id, item, &err),
        }
    }

    fn handle_failure(&self, id: &PlacementId, item: WorkItem, err: &ReconcileError) {
        tracing::warn!(placement = %id, error = %err, "reconciliation failed");
        self.services.queue.done(&item);
        match err.kind() {
            tmc_core::error::ErrorKind::Conflict => {
                // Optimistic-concurrency conflict: requeue immediately, no backoff count.
                let _ = self.services.queue.add(item);
            }
            tmc_core::error::ErrorKind::QuotaExceeded | tmc_core::error::ErrorKind::Transient => {
                if self.retry_policy.exhausted(item.attempts) {
                    let workspace = item.workspace;
                    self.services.events.add(Event::new(
                        EventType::Error,
                        "ReconcileFailed",
                        format!("placement {id} exhausted retries: {err}"),
                        workspace,
                        "reconcile-controller",
                    ));
                } else {
                    let mut retried = item;
                    retried.attempts += 1;
                    retried.last_error = Some(err.to_string());
                    let delay = self.retry_policy.delay_for(retried.attempts);
                    let _ = self.services.queue.add_after(retried, delay);
                }
            }
            tmc_core::error::ErrorKind::Invalid | tmc_core::error::ErrorKind::Unauthorized | tmc_core::error::ErrorKind::ConflictUnresolved | tmc_core::error::ErrorKind::CircuitOpen => {
                // No retry until the next generation arrives via a fresh enqueue.
            }
        }
    }

    /// The six-step reconcile algorithm (spec.md §4.H).
    async fn reconcile_one(&self, id: &PlacementId, item: &WorkItem) -> Result<(), ReconcileError> {
        // 1. Fetch placement; if missing, mark item done (caller does that).
        let Some(spec) = self.services.store.get(id).await? else {
            self.observed.lock().expect("observed lock poisoned").remove(id);
            return Ok(());
        };

        let mut status = self.observed.lock().expect("observed lock poisoned").get(id).cloned().unwrap_or_default();

        // 2. Recompute decision if the generation moved or this is a retry.
        let needs_decision = spec.generation != status.observed_generation || item.attempts > 0;
        let decision = if needs_decision {
            let request = tmc_core::placement::PlacementRequest {
                id: spec.id.clone(),
                workspace: spec.workspace.clone(),
                generation: spec.generation,
                workload_selector: spec.workload_selector.clone(),
                location_filter: spec.location_filter.clone(),
                constraints: spec.constraints.clone(),
                strategy: spec.strategy,
                replicas: spec.replicas,
                traffic_percent: spec.traffic_percent,
                progress_deadline: spec.progress_deadline,
            };
            match self.services.placement.decide(&request, self.services.registry.as_ref()).await {
                Ok(decision) => decision,
                Err(placement_err) => {
                    let reason = match placement_err {
                        tmc_core::placement::PlacementError::NoCandidates => ConditionReason::NoCandidates,
                        tmc_core::placement::PlacementError::AllUnsuitable => ConditionReason::AllUnsuitable,
                        _ => ConditionReason::ClusterUnhealthy,
                    };
                    status.conditions = vec![failed_condition(reason, placement_err.to_string())];
                    let _ = self.services.store.write_status(id, status.observed_generation, status).await;
                    return Err(placement_err.into());
                }
            }
        } else {
            return Ok(());
        };

        // 3. Consult quota before materializing the decision.
        let requested = requested_resources(&spec.constraints);
        if !requested.is_empty() {
            let result = self.services.quota.request_allocation(&AllocationRequest {
                workspace: spec.workspace.clone(),
                requested,
                allow_burst: false,
            });
            if !result.approved {
                status.conditions = vec![Condition {
                    condition_type: ConditionType::QuotaDenied,
                    status: true,
                    reason: ConditionReason::QuotaExceeded,
                    message: result.reason.unwrap_or_default(),
                    last_transition: Utc::now(),
                }];
                self.observed.lock().expect("observed lock poisoned").insert(id.clone(), status.clone());
                let _ = self.services.store.write_status(id, status.observed_generation, status).await;
                return Err(ReconcileError::QuotaDenied(format!("workspace {} quota exceeded", spec.workspace)));
            }
        }

        // 4. Reconcile sync items to match selectedClusters: add missing, delete stale,
        // then drive each desired target through the sync state machine (spec.md §4.F
        // transform application + conflict resolution, §4.H step 4).
        let desired: Vec<(SyncKey, u64, Value)> = decision
            .selected_clusters
            .iter()
            .map(|cluster| {
                let key = SyncKey {
                    workspace: spec.workspace.clone(),
                    gvr: Gvr { group: String::new(), version: "v1".into(), resource: "placements".into() },
                    namespace: None,
                    name: spec.id.to_string(),
                    target_cluster: cluster.clone(),
                };
                let payload = serde_json::json!({
                    "placementId": spec.id.to_string(),
                    "generation": spec.generation,
                    "replicas": spec.replicas,
                    "trafficPercent": spec.traffic_percent,
                });
                (key, spec.generation, payload)
            })
            .collect();
        let desired_keys: Vec<SyncKey> = desired.iter().map(|(key, _, _)| key.clone()).collect();
        self.services.syncer.reconcile_targets(desired);

        for key in &desired_keys {
            // No tunnel ships in this crate (spec.md §1/§6 Non-goals), so the target's
            // observed spec is unknown here; `sync_one` still applies the transform
            // chain and advances Pending -> Syncing -> Synced/Failed.
            match self.services.syncer.sync_one(key, None) {
                Ok(_) | Err(SyncError::AlreadyInFlight(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        // 5. Write status under optimistic concurrency.
        status.observed_generation = spec.generation;
        status.placed_clusters = decision.selected_clusters.clone();
        status.conditions = placement_conditions(&decision, spec.replicas);
        let write_result = self.services.store.write_status(id, status.observed_generation, status.clone()).await;

        // 6. Emit events at phase transitions.
        self.services.events.add(Event::new(
            EventType::Normal,
            "Scheduled",
            format!("placement {id} scheduled to {} clusters", decision.selected_clusters.len()),
            spec.workspace.clone(),
            "reconcile-controller",
        ));

        write_result?;
        self.observed.lock().expect("observed lock poisoned").insert(id.clone(), status);
        Ok(())
    }
}

fn placement_id_from_key(key: &str) -> Option<PlacementId> {
    let rest = key.strip_prefix("placement:")?;
    let id = rest.rsplit_once(':').map_or(rest, |(_, id)| id);
    PlacementId::parse(id).ok()
}

fn requested_resources(constraints: &[tmc_core::constraints::Constraint]) -> ResourceMap {
    let mut total = ResourceMap::new();
    for constraint in constraints {
        for (resource, qty) in &constraint.requested {
            *total.entry(resource.clone()).or_insert(0.0) += qty;
        }
    }
    total
}

fn failed_condition(reason: ConditionReason, message: String) -> Condition {
    Condition { condition_type: ConditionType::Failed, status: true, reason, message, last_transition: Utc::now() }
}

fn placement_conditions(decision: &tmc_core::placement::PlacementDecision, replicas: u32) -> Vec<Condition> {
    let degraded = u32::try_from(decision.selected_clusters.len()).unwrap_or(u32::MAX) < replicas;
    let mut conditions = vec![Condition {
        condition_type: ConditionType::Ready,
        status: true,
        reason: ConditionReason::Succeeded,
        message: format!("placed on {} clusters", decision.selected_clusters.len()),
        last_transition: Utc::now(),
    }];
    if degraded {
        conditions.push(Condition {
            condition_type: ConditionType::Degraded,
            status: true,
            reason: ConditionReason::Progressing,
            message: "fewer healthy candidates than requested replicas".into(),
            last_transition: Utc::now(),
        });
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tmc_core::cluster::Cluster;
    use tmc_core::events::EventBus;
    use tmc_core::external::{ClusterRegistry, PlacementSpec, RegistryError};
    use tmc_core::health::HealthMonitor;
    use tmc_core::ids::ClusterName;
    use tmc_core::placement::{PlacementEngine, ScoringWeights, Strategy};
    use tmc_core::queue::{CircuitBreaker, CircuitBreakerConfig, WorkQueue};
    use tmc_core::quota::QuotaManager;
    use tmc_core::sync::{ConflictResolution, SyncerCore, TransformChain};

    struct FakeRegistry(Vec<Cluster>);

    #[async_trait]
    impl ClusterRegistry for FakeRegistry {
        async fn get_available_clusters(&self) -> Result<Vec<Cluster>, RegistryError> {
            Ok(self.0.clone())
        }
        async fn update_health(&self, _c: &ClusterName, _h: bool) -> Result<(), RegistryError> {
            Ok(())
        }
        async fn update_usage(&self, _c: &ClusterName, _a: ResourceMap) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    struct FakeStore(Mutex<HashMap<PlacementId, PlacementSpec>>);

    #[async_trait]
    impl tmc_core::external::PlacementStore for FakeStore {
        async fn get(&self, id: &PlacementId) -> Result<Option<PlacementSpec>, PlacementStoreError> {
            Ok(self.0.lock().unwrap().get(id).cloned())
        }
        async fn write_status(&self, _id: &PlacementId, _expected: u64, _status: PlacementStatus) -> Result<(), PlacementStoreError> {
            Ok(())
        }
    }

    async fn services(clusters: Vec<Cluster>, specs: Vec<PlacementSpec>) -> CoreServices {
        let mut map = HashMap::new();
        for spec in specs {
            map.insert(spec.id.clone(), spec);
        }
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let leases = tmc_core::health::LeaseStore::new(pool).await.unwrap();
        let health = HealthMonitor::new(
            leases,
            "reconcile-controller",
            "tmc",
            "test-holder",
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(30),
            3,
        );
        CoreServices::new(
            Arc::new(WorkQueue::new("test", RetryPolicy::default(), CircuitBreaker::new(CircuitBreakerConfig::default()))),
            Arc::new(EventBus::new(chrono::Duration::hours(1), std::time::Duration::from_secs(5))),
            Arc::new(PlacementEngine::new(ScoringWeights::default(), 0)),
            Arc::new(QuotaManager::new(1.0)),
            Arc::new(SyncerCore::new(TransformChain::default(), ConflictResolution::SourceWins, RetryPolicy::default())),
            Arc::new(health),
            Arc::new(FakeRegistry(clusters)),
            Arc::new(FakeStore(Mutex::new(map))),
        )
    }

    fn spec(id: &str, workspace: &str, replicas: u32) -> PlacementSpec {
        PlacementSpec {
            id: PlacementId::parse(id).unwrap(),
            workspace: WorkspaceName::parse(workspace).unwrap(),
            generation: 1,
            workload_selector: tmc_core::cluster::WorkloadSelector::default(),
            location_filter: None,
            constraints: Vec::new(),
            strategy: Strategy::RoundRobin,
            replicas,
            traffic_percent: 100,
            progress_deadline: std::time::Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn missing_placement_completes_without_error() {
        let services = services(Vec::new(), Vec::new()).await;
        let controller = ReconcileController::new(services, 1, RetryPolicy::default());
        let id = PlacementId::parse("gone").unwrap();
        let item = WorkItem::new("placement", WorkspaceName::parse("acme").unwrap(), "gone", Priority::Normal);
        controller.reconcile_one(&id, &item).await.unwrap();
    }

    #[tokio::test]
    async fn happy_path_schedules_and_writes_status() {
        let cluster_a = Cluster::new(ClusterName::parse("a").unwrap(), "us");
        let cluster_b = Cluster::new(ClusterName::parse("b").unwrap(), "us");
        let placement_spec = spec("p1", "acme", 2);
        let services = services(vec![cluster_a, cluster_b], vec![placement_spec.clone()]).await;
        let controller = ReconcileController::new(services, 1, RetryPolicy::default());
        let item = WorkItem::new("placement", placement_spec.workspace.clone(), "p1", Priority::Normal);
        controller.reconcile_one(&placement_spec.id, &item).await.unwrap();
        let status = controller.observed.lock().unwrap().get(&placement_spec.id).unwrap().clone();
        assert_eq!(status.placed_clusters.len(), 2);
        assert_eq!(status.observed_generation, 1);
    }

    #[test]
    fn placement_key_roundtrips() {
        let ws = WorkspaceName::parse("team:acme").unwrap();
        let key = WorkItem::make_key("placement", &ws, "p1");
        assert_eq!(placement_id_from_key(&key).unwrap().as_str(), "p1");
    }
}
