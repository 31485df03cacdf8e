//! `tmc-core` — placement, quota, sync, and reconciliation substrate for the
//! TMC multi-cluster control plane (spec.md §1-§8).
//!
//! This crate houses the leaf and mid-tier components (A–G) of the pipeline
//! described in spec.md §2: the work queue, event bus, constraint engine,
//! placement engine, quota manager, syncer core, and health monitor. The
//! reconcile controller that binds them (H) lives in `tmc-orchestrator`.

pub mod cluster;
pub mod constraints;
pub mod error;
pub mod events;
pub mod external;
pub mod health;
pub mod ids;
pub mod placement;
pub mod quota;
pub mod queue;
pub mod sync;

pub use cluster::{Cluster, ResourceMap, ResourceName, WorkloadSelector};
pub use error::{Error, ErrorKind, Result};
pub use external::{
    ClusterRegistry, Condition, ConditionReason, ConditionType, PlacementSpec, PlacementStatus,
    PlacementStore, PlacementStoreError, RegistryError, Tunnel, TunnelAuth, TunnelError,
    TunnelState, TunnelStats,
};
pub use ids::{ClusterName, IdError, PlacementId, WorkspaceName};
