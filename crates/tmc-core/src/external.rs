//! External collaborator interfaces (spec.md §6).
//!
//! These traits describe contracts the core *consumes*; no concrete network
//! implementation ships here — that belongs to the out-of-scope API server /
//! tunnel-protocol layers this crate treats as opaque.

use async_trait::async_trait;
use thiserror::Error;

use crate::cluster::Cluster;
use crate::ids::ClusterName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cluster registry temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("unknown cluster: {0}")]
    NotFound(ClusterName),
}

/// The cluster registry collaborator (spec.md §6).
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn get_available_clusters(&self) -> Result<Vec<Cluster>, RegistryError>;
    async fn update_health(&self, cluster: &ClusterName, healthy: bool) -> Result<(), RegistryError>;
    async fn update_usage(&self, cluster: &ClusterName, allocated: crate::cluster::ResourceMap) -> Result<(), RegistryError>;
}

/// Connection state of a [`Tunnel`] (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Connected,
    Connecting,
    Disconnected,
}

/// Authentication scheme a tunnel was established with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelAuth {
    BearerToken,
    Mtls,
    ServiceAccountToken,
}

#[derive(Debug, Clone, Default)]
pub struct TunnelStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("tunnel closed")]
    Closed,
    #[error("tunnel send/receive failed: {0}")]
    Io(String),
}

/// Bidirectional bytestream abstraction the syncer pushes/pulls through. The core
/// never speaks a specific wire protocol — it only consumes `Send`/`Receive`/
/// `Close`/`State` and state-change events (spec.md §1 Non-goals, §6).
#[async_trait]
pub trait Tunnel: Send + Sync {
    async fn send(&self, payload: &[u8]) -> Result<(), TunnelError>;
    async fn receive(&self) -> Result<Vec<u8>, TunnelError>;
    async fn close(&self) -> Result<(), TunnelError>;
    fn state(&self) -> TunnelState;
    fn stats(&self) -> TunnelStats;
    fn ping(&self) -> Result<(), TunnelError>;
}

/// A condition type from the closed vocabulary the reconcile controller writes
/// (spec.md §6 "Placement API").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConditionType {
    Ready,
    Scheduled,
    QuotaDenied,
    Degraded,
    Failed,
}

/// A reason from the closed vocabulary attached to a condition (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConditionReason {
    NoCandidates,
    AllUnsuitable,
    QuotaExceeded,
    ClusterUnhealthy,
    ConflictUnresolved,
    Progressing,
    Succeeded,
}

/// One status condition, following the closed `ConditionType`/`ConditionReason`
/// vocabulary in spec.md §6.
#[derive(Debug, Clone)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub status: bool,
    pub reason: ConditionReason,
    pub message: String,
    pub last_transition: chrono::DateTime<chrono::Utc>,
}

/// The placement object's spec half, as the controller reads it (spec.md §3
/// "Placement request", §6 "Placement API").
#[derive(Debug, Clone)]
pub struct PlacementSpec {
    pub id: crate::ids::PlacementId,
    pub workspace: crate::ids::WorkspaceName,
    pub generation: u64,
    pub workload_selector: crate::cluster::WorkloadSelector,
    pub location_filter: Option<Vec<String>>,
    pub constraints: Vec<crate::constraints::Constraint>,
    pub strategy: crate::placement::Strategy,
    pub replicas: u32,
    pub traffic_percent: u8,
    pub progress_deadline: std::time::Duration,
}

/// The placement object's status half, exclusively owned and written by the
/// reconcile controller (spec.md §3 "Ownership").
#[derive(Debug, Clone, Default)]
pub struct PlacementStatus {
    pub observed_generation: u64,
    pub placed_clusters: Vec<ClusterName>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementStoreError {
    #[error("placement {0} not found")]
    NotFound(crate::ids::PlacementId),

    #[error("optimistic concurrency conflict writing status for {0}")]
    Conflict(crate::ids::PlacementId),
}

/// The placement object store collaborator: the controller reads spec, writes
/// status, under optimistic concurrency (spec.md §4.H step 5, §6).
#[async_trait]
pub trait PlacementStore: Send + Sync {
    async fn get(&self, id: &crate::ids::PlacementId) -> Result<Option<PlacementSpec>, PlacementStoreError>;

    /// Writes `status` for `id`, failing with `Conflict` if `expected_generation`
    /// no longer matches the object's current `observedGeneration` (optimistic
    /// concurrency, spec.md §4.H step 5).
    async fn write_status(
        &self,
        id: &crate::ids::PlacementId,
        expected_generation: u64,
        status: PlacementStatus,
    ) -> Result<(), PlacementStoreError>;
}
