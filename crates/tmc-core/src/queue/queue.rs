//! The priority-heap-backed, rate-limited, workspace-aware work queue
//! (spec.md §4.A).

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant as TokioInstant;

use super::backoff::RetryPolicy;
use super::circuit::CircuitBreaker;
use super::item::{next_sequence, Priority, WorkItem};

/// Errors returned by the work queue (spec.md §7 taxonomy: `Transient`/`CircuitOpen`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is shutting down")]
    ShuttingDown,

    #[error("circuit breaker is open, admission rejected")]
    CircuitOpen,

    #[error("item exceeded max attempts and was dropped: {0}")]
    RetriesExhausted(String),
}

impl QueueError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        match self {
            Self::ShuttingDown => crate::error::ErrorKind::Invalid,
            Self::CircuitOpen => crate::error::ErrorKind::CircuitOpen,
            Self::RetriesExhausted(_) => crate::error::ErrorKind::Transient,
        }
    }
}

/// A heap entry: ties broken by insertion sequence for FIFO determinism.
#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    effective_priority: i64,
    sequence: u64,
    key: String,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want the *lowest* effective_priority (most
        // urgent) on top, so reverse the numeric ordering, then break ties by the
        // *earliest* sequence number (also reversed, since earlier == smaller).
        other
            .effective_priority
            .cmp(&self.effective_priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct State {
    items: HashMap<String, WorkItem>,
    /// Keys ready to be dequeued right now (not deferred, not in-flight).
    ready: HashSet<String>,
    /// Keys deferred until a future instant via `AddAfter`.
    deferred_until: HashMap<String, TokioInstant>,
    /// Keys currently checked out by a worker (between `Get` and `Done`).
    processing: HashSet<String>,
    /// Keys re-`Add`ed while already processing; re-enqueued on `Done`.
    dirty: HashSet<String>,
    /// Per-key retry counters, retained across `Done` until `Forget`.
    requeues: HashMap<String, u32>,
    shutting_down: bool,
}

impl State {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            ready: HashSet::new(),
            deferred_until: HashMap::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            requeues: HashMap::new(),
            shutting_down: false,
        }
    }

    fn promote_deferred(&mut self, now: TokioInstant) {
        let due: Vec<String> = self
            .deferred_until
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in due {
            self.deferred_until.remove(&key);
            if !self.processing.contains(&key) {
                self.ready.insert(key);
            }
        }
    }
}

/// The queue itself: string keys, priority ordering, rate limiting via backoff, and
/// circuit breaking, as specified in spec.md §4.A.
pub struct WorkQueue {
    name: String,
    state: Mutex<State>,
    notify: Notify,
    pub retry_policy: RetryPolicy,
    pub circuit_breaker: CircuitBreaker,
}

impl WorkQueue {
    #[must_use]
    pub fn new(name: impl Into<String>, retry_policy: RetryPolicy, circuit_breaker: CircuitBreaker) -> Self {
        Self { name: name.into(), state: Mutex::new(State::new()), notify: Notify::new(), retry_policy, circuit_breaker }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Idempotent insert at the item's own priority. Re-adding an item that is
    /// currently being processed marks it dirty for re-delivery after `Done`.
    pub fn add(&self, item: WorkItem) -> Result<(), QueueError> {
        self.add_with_priority(item, None)
    }

    /// As `add`, but raises the item to `priority` if it is already queued at a
    /// lower priority (the "heap fix" described in spec.md §4.A).
    pub fn add_with_priority(&self, mut item: WorkItem, priority: Option<Priority>) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(QueueError::ShuttingDown);
        }
        if let Some(p) = priority {
            item.priority = item.priority.min(p);
        }
        let key = item.key.clone();
        if state.processing.contains(&key) {
            state.dirty.insert(key.clone());
            // Keep the freshest metadata for when it's re-enqueued after Done.
            state.items.insert(key, item);
        } else {
            // Re-adding an already-queued key only ever raises (never lowers) its
            // priority — the "heap fix" in spec.md §4.A.
            if let Some(existing) = state.items.get(&key) {
                item.priority = item.priority.min(existing.priority);
            }
            state.items.insert(key.clone(), item);
            state.deferred_until.remove(&key);
            state.ready.insert(key);
        }
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Defers eligibility by `delay` — the mechanism backoff retries use.
    pub fn add_after(&self, item: WorkItem, delay: Duration) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(QueueError::ShuttingDown);
        }
        let key = item.key.clone();
        state.items.insert(key.clone(), item);
        state.ready.remove(&key);
        state.deferred_until.insert(key, TokioInstant::now() + delay);
        Ok(())
    }

    /// Consults the rate limiter (backoff-derived delay keyed by retry count) and
    /// the circuit breaker before enqueueing.
    pub fn add_rate_limited(&self, item: WorkItem) -> Result<(), QueueError> {
        if !self.circuit_breaker.allow() {
            return Err(QueueError::CircuitOpen);
        }
        let attempts = {
            let state = self.lock();
            *state.requeues.get(&item.key).unwrap_or(&0)
        };
        if self.retry_policy.exhausted(attempts) {
            self.circuit_breaker.record_failure();
            return Err(QueueError::RetriesExhausted(item.key));
        }
        let delay = self.retry_policy.delay_for(attempts);
        {
            let mut state = self.lock();
            *state.requeues.entry(item.key.clone()).or_insert(0) += 1;
        }
        if delay.is_zero() {
            self.add(item)
        } else {
            self.add_after(item, delay)
        }
    }

    /// Blocks until a ready item exists or the queue shuts down. Returns `None` on
    /// shutdown (`quit=true` in spec.md's vocabulary), otherwise the highest
    /// effective-priority ready item, now marked in-flight.
    pub async fn get(&self) -> Option<WorkItem> {
        loop {
            {
                let mut state = self.lock();
                state.promote_deferred(TokioInstant::now());
                if state.shutting_down && state.ready.is_empty() {
                    return None;
                }
                if let Some(key) = self.pick_ready_key(&state) {
                    state.ready.remove(&key);
                    state.processing.insert(key.clone());
                    if let Some(item) = state.items.get(&key).cloned() {
                        return Some(item);
                    }
                }
            }
            let wait = tokio::time::sleep(Duration::from_millis(50));
            tokio::select! {
                () = self.notify.notified() => {}
                () = wait => {}
            }
        }
    }

    /// Scans ready items and returns the key with minimum effective priority
    /// (maximum urgency), ties broken by insertion order — the literal reading of
    /// the invariant in spec.md §8 ("the item returned by `Get` has the maximum
    /// effective priority among ready items").
    fn pick_ready_key(&self, state: &State) -> Option<String> {
        let now = Utc::now();
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        for key in &state.ready {
            if let Some(item) = state.items.get(key) {
                heap.push(HeapEntry {
                    effective_priority: item.effective_priority(now),
                    sequence: sequence_for(item),
                    key: key.clone(),
                });
            }
        }
        heap.pop().map(|e| e.key)
    }

    /// Releases the in-flight slot. If the item was re-`Add`ed while processing,
    /// it is re-enqueued now (classic workqueue "dirty" re-delivery semantics).
    pub fn done(&self, item: &WorkItem) {
        let mut state = self.lock();
        state.processing.remove(&item.key);
        if state.dirty.remove(&item.key) {
            state.deferred_until.remove(&item.key);
            state.ready.insert(item.key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Clears the rate limiter's memory of this key (so the next `add_rate_limited`
    /// starts from zero backoff).
    pub fn forget(&self, key: &str) {
        let mut state = self.lock();
        state.requeues.remove(key);
    }

    /// Per-key retry count as tracked by `add_rate_limited`.
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        let state = self.lock();
        *state.requeues.get(key).unwrap_or(&0)
    }

    /// Idempotent shutdown. After this call, `Add*` rejects and `Get` eventually
    /// returns `None` once in-flight and ready items have been drained by workers
    /// (pending in-flight items run to completion under the caller's own grace
    /// period; this type does not itself impose one).
    pub fn shut_down(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        state.ready.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sequence_for(item: &WorkItem) -> u64 {
    // Re-derive a stable ordering key from creation time since WorkItem doesn't
    // carry an explicit sequence; nanosecond creation timestamps are unique enough
    // in practice and keep WorkItem free of queue-internal bookkeeping fields.
    item.created_at.timestamp_nanos_opt().unwrap_or_else(|| next_sequence() as i64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceName;

    fn ws() -> WorkspaceName {
        WorkspaceName::parse("team:acme").unwrap()
    }

    fn queue() -> WorkQueue {
        WorkQueue::new("test", RetryPolicy::default(), CircuitBreaker::new(Default::default()))
    }

    #[tokio::test]
    async fn get_returns_highest_priority_first() {
        let q = queue();
        q.add(WorkItem::new("reconcile", ws(), "low", Priority::Low)).unwrap();
        q.add(WorkItem::new("reconcile", ws(), "imm", Priority::Immediate)).unwrap();
        let first = q.get().await.unwrap();
        assert!(first.key.contains("imm"));
    }

    #[tokio::test]
    async fn done_requeues_dirty_items() {
        let q = queue();
        let item = WorkItem::new("reconcile", ws(), "p1", Priority::Normal);
        q.add(item.clone()).unwrap();
        let got = q.get().await.unwrap();
        // Re-add while processing -> marks dirty.
        q.add(item.clone()).unwrap();
        assert_eq!(q.len(), 0, "dirty re-add must not appear ready until Done");
        q.done(&got);
        assert_eq!(q.len(), 1, "Done must re-enqueue the dirty item");
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_unblocks_get() {
        let q = queue();
        q.shut_down();
        q.shut_down();
        assert!(q.is_shutting_down());
        assert!(q.get().await.is_none());
    }

    #[test]
    fn add_after_defers_until_delay_elapses() {
        let q = queue();
        let item = WorkItem::new("reconcile", ws(), "p1", Priority::Normal);
        q.add_after(item, Duration::from_hours(1)).unwrap();
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn forget_resets_requeue_count() {
        let q = queue();
        let item = WorkItem::new("reconcile", ws(), "p1", Priority::Normal);
        q.add_rate_limited(item).unwrap();
        assert_eq!(q.num_requeues("reconcile:team:acme:p1"), 1);
        q.forget("reconcile:team:acme:p1");
        assert_eq!(q.num_requeues("reconcile:team:acme:p1"), 0);
    }
}
