//! # Syncer Core (spec.md §4.F)
//!
//! Synchronizes a source workspace object with 0..N target-cluster
//! materializations: pushes specs down through a [`transform::TransformChain`],
//! pulls status back up, resolves conflicts per [`types::ConflictResolution`],
//! and reports aggregate [`types::SyncStatus`].

pub mod syncer;
pub mod transform;
pub mod types;

pub use syncer::{SyncError, SyncerCore};
pub use transform::{Transform, TransformChain, TransformError};
pub use types::{ConflictResolution, Direction, Gvr, SyncItem, SyncKey, SyncState, SyncStatus};
