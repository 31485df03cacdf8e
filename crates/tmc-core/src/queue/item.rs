//! Work item types and the effective-priority formula (spec.md §4.A).

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::ids::WorkspaceName;

/// Base priority band. Numerically lower means more urgent; `Immediate` is the
/// floor that nothing can become more urgent than (spec.md §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    Immediate,
    High,
    Normal,
    Low,
    Bulk,
}

impl Priority {
    /// The base numeric value used in the effective-priority formula.
    #[must_use]
    pub const fn base_value(self) -> i64 {
        match self {
            Self::Immediate => 0,
            Self::High => 250,
            Self::Normal => 500,
            Self::Low => 750,
            Self::Bulk => 1000,
        }
    }
}

/// A unit of reconcile work (spec.md §3 "Work item").
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub key: String,
    pub kind: String,
    pub workspace: WorkspaceName,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub processing_timeout: std::time::Duration,
}

impl WorkItem {
    /// Builds the key format from spec.md §3: `"{type}:{workspace}:{id}"`.
    #[must_use]
    pub fn make_key(kind: &str, workspace: &WorkspaceName, id: &str) -> String {
        format!("{kind}:{workspace}:{id}")
    }

    pub fn new(kind: impl Into<String>, workspace: WorkspaceName, id: &str, priority: Priority) -> Self {
        let kind = kind.into();
        let key = Self::make_key(&kind, &workspace, id);
        Self {
            key,
            kind,
            workspace,
            priority,
            created_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
            processing_timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Effective priority: `basePriority − ⌊age/30s⌋·10 − attempts·25`, floored at
    /// `Immediate`'s value (0). Lower is more urgent (`Priority::base_value`'s
    /// ordering), so subtracting the age/attempt bonus — rather than adding it —
    /// is what pulls a starved or retried item toward the front of the queue.
    #[must_use]
    pub fn effective_priority(&self, now: DateTime<Utc>) -> i64 {
        let age_secs = (now - self.created_at).num_seconds().max(0);
        let age_bonus = (age_secs / 30) * 10;
        let attempt_bonus = i64::from(self.attempts) * 25;
        (self.priority.base_value() - age_bonus - attempt_bonus).max(Priority::Immediate.base_value())
    }
}

/// Monotonic sequence counter used to break exact ties deterministically (FIFO
/// within the same effective priority), since `Date::now`/`Instant::now` alone
/// cannot order same-instant insertions.
#[must_use]
pub fn next_sequence() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Wall-clock helper kept local to the queue so tests can reason about it without
/// pulling in a fake-clock dependency the teacher doesn't use.
#[must_use]
pub fn unix_now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
