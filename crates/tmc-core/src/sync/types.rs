//! Sync item data model (spec.md §3 "Sync item", §4.F).

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ids::{ClusterName, WorkspaceName};

/// Direction a sync item carries data (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source spec → target cluster.
    UpToDown,
    /// Target status → source.
    DownToUp,
}

/// Lifecycle state of a sync item (spec.md §4.F state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Syncing,
    Synced,
    Failed,
    Deleting,
}

/// Conflict resolution policy for colliding fields between source and target
/// (spec.md §4.F "Conflict resolution").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    SourceWins,
    TargetWins,
    Manual,
}

/// A group-version-resource coordinate, mirroring the external placement API's
/// object addressing scheme (opaque to this crate beyond equality/display).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl std::fmt::Display for Gvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Uniquely addresses one sync item's identity (spec.md §3 invariant: at most
/// one active sync item per this tuple).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncKey {
    pub workspace: WorkspaceName,
    pub gvr: Gvr,
    pub namespace: Option<String>,
    pub name: String,
    pub target_cluster: ClusterName,
}

/// One unit of bidirectional sync work (spec.md §3 "Sync item").
#[derive(Debug, Clone)]
pub struct SyncItem {
    pub key: SyncKey,
    pub generation: u64,
    pub direction: Direction,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub state: SyncState,
    pub spec: Value,
    pub status: Value,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncItem {
    #[must_use]
    pub const fn new(key: SyncKey, generation: u64, direction: Direction, spec: Value) -> Self {
        Self { key, generation, direction, attempts: 0, last_error: None, state: SyncState::Pending, spec, status: Value::Null, last_sync_time: None }
    }
}

/// Aggregate health across all sync items for one reconciliation (spec.md §4.F
/// "Status aggregation").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
}

impl SyncStatus {
    #[must_use]
    pub fn health(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.synced as f64 / self.total as f64
    }
}
