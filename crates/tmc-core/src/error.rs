//! Crate-wide error taxonomy (spec.md §7).
//!
//! Every component returns its own typed error; this enum is the point where the
//! reconcile controller (and tests) can reason about the taxonomy uniformly without
//! losing the originating detail. Kinds map 1:1 onto the retry policy table in
//! spec.md §7: `Transient` and `CircuitOpen` are retryable, `Invalid` and
//! `Unauthorized` are not, `Conflict` bypasses backoff accounting.

use thiserror::Error;

use crate::ids::IdError;

/// The retry disposition of an error, independent of its source component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local retry via the work queue with backoff; fatal after `maxAttempts`.
    Transient,
    /// Optimistic-concurrency conflict; requeue immediately, no backoff count.
    Conflict,
    /// Malformed input; surfaced on status, no retry until next generation.
    Invalid,
    /// Auth failure at a boundary; surfaced, no retry, operator must intervene.
    Unauthorized,
    /// Circuit breaker rejected admission; retry once the breaker closes.
    CircuitOpen,
    /// Quota denied; one backoff retry, then fatal.
    QuotaExceeded,
    /// Sync conflict under `Manual` policy; fatal until generation advances.
    ConflictUnresolved,
}

/// Crate-wide error type, one variant per component.
#[derive(Debug, Error)]
pub enum Error {
    #[error("identifier error: {0}")]
    Id(#[from] IdError),

    #[error("work queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("event bus error: {0}")]
    Event(#[from] crate::events::EventError),

    #[error("constraint evaluation error: {0}")]
    Constraint(#[from] crate::constraints::ConstraintError),

    #[error("placement error: {0}")]
    Placement(#[from] crate::placement::PlacementError),

    #[error("quota error: {0}")]
    Quota(#[from] crate::quota::QuotaError),

    #[error("sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),

    #[error("health monitor error: {0}")]
    Health(#[from] crate::health::HealthError),
}

impl Error {
    /// Classifies this error for the retry policy table in spec.md §7.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Id(_) => ErrorKind::Invalid,
            Self::Queue(e) => e.kind(),
            Self::Event(_) => ErrorKind::Transient,
            Self::Constraint(_) => ErrorKind::Invalid,
            Self::Placement(e) => e.kind(),
            Self::Quota(e) => e.kind(),
            Self::Sync(e) => e.kind(),
            Self::Health(_) => ErrorKind::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
