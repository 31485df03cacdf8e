//! In-memory event bus with dedup, retention, and concurrent listener fan-out
//! (spec.md §4.B).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use thiserror::Error;

use super::types::{DedupKey, Event};
use crate::ids::WorkspaceName;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("listener '{0}' timed out after {1:?}")]
    ListenerTimeout(String, Duration),

    #[error("listener '{0}' panicked: {1}")]
    ListenerPanicked(String, String),
}

/// A registered listener: receives notifications for a subset of event types
/// (empty = all), subject to a per-call timeout.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> &str;
    fn types(&self) -> &[super::types::EventType];
    async fn on_event(&self, event: &Event);
}

struct Retention {
    max_age: chrono::Duration,
    last_cleanup: DateTime<Utc>,
    sweep_interval: chrono::Duration,
}

struct Inner {
    events: HashMap<DedupKey, Event>,
    by_workspace: HashMap<WorkspaceName, Vec<DedupKey>>,
    retention: Retention,
}

/// Typed, workspace-scoped event bus (spec.md §4.B).
pub struct EventBus {
    inner: RwLock<Inner>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    notification_timeout: Duration,
}

impl EventBus {
    #[must_use]
    pub fn new(max_age: chrono::Duration, notification_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                events: HashMap::new(),
                by_workspace: HashMap::new(),
                retention: Retention { max_age, last_cleanup: Utc::now(), sweep_interval: chrono::Duration::hours(1) },
            }),
            listeners: RwLock::new(Vec::new()),
            notification_timeout,
        }
    }

    pub fn register(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().unwrap_or_else(std::sync::PoisonError::into_inner).push(listener);
    }

    /// Records `event`, deduplicating against the retention window: an identical
    /// `(workspace,type,reason,object,source)` bumps `count` and refreshes
    /// `timestamp` rather than creating a second record.
    pub fn add(&self, event: Event) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_sweep(&mut inner);
        let key = event.dedup_key();
        if let Some(existing) = inner.events.get_mut(&key) {
            existing.count += 1;
            existing.timestamp = event.timestamp;
            existing.message = event.message;
        } else {
            inner.by_workspace.entry(event.workspace.clone()).or_default().push(key.clone());
            inner.events.insert(key, event);
        }
    }

    fn maybe_sweep(&self, inner: &mut Inner) {
        let now = Utc::now();
        if now - inner.retention.last_cleanup <= inner.retention.sweep_interval {
            return;
        }
        inner.retention.last_cleanup = now;
        let max_age = inner.retention.max_age;
        let stale: Vec<DedupKey> =
            inner.events.iter().filter(|(_, e)| now - e.timestamp > max_age).map(|(k, _)| k.clone()).collect();
        for key in stale {
            inner.events.remove(&key);
        }
        for keys in inner.by_workspace.values_mut() {
            keys.retain(|k| inner.events.contains_key(k));
        }
    }

    #[must_use]
    pub fn for_workspace(&self, workspace: &WorkspaceName) -> Vec<Event> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .by_workspace
            .get(workspace)
            .map(|keys| keys.iter().filter_map(|k| inner.events.get(k)).cloned().collect())
            .unwrap_or_default()
    }

    /// Concurrently notifies every interested listener of `event`, bounding each
    /// call by `notification_timeout` and recovering a panicking listener rather
    /// than letting it cross this call's boundary (spec.md §4.B, §7).
    pub async fn notify(&self, event: &Event) -> Vec<EventError> {
        let listeners: Vec<Arc<dyn Listener>> = {
            let guard = self.listeners.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard
                .iter()
                .filter(|l| l.types().is_empty() || l.types().contains(&event.event_type))
                .cloned()
                .collect()
        };

        let timeout = self.notification_timeout;
        let futures = listeners.into_iter().map(|listener| {
            let event = event.clone();
            async move {
                let name = listener.name().to_string();
                let call = AssertUnwindSafe(listener.on_event(&event)).catch_unwind();
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(())) => None,
                    Ok(Err(panic)) => {
                        let msg = panic_message(&panic);
                        Some(EventError::ListenerPanicked(name, msg))
                    }
                    Err(_) => Some(EventError::ListenerTimeout(name, timeout)),
                }
            }
        });
        futures::future::join_all(futures).await.into_iter().flatten().collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ws() -> WorkspaceName {
        WorkspaceName::parse("team:acme").unwrap()
    }

    #[test]
    fn duplicate_events_bump_count() {
        let bus = EventBus::new(chrono::Duration::hours(24), Duration::from_secs(1));
        for _ in 0..3 {
            bus.add(Event::new(EventType::Warning, "QuotaExceeded", "msg", ws(), "quota-manager"));
        }
        let events = bus.for_workspace(&ws());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 3);
    }

    struct CountingListener {
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Listener for CountingListener {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn types(&self) -> &[EventType] {
            &[]
        }
        async fn on_event(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn notify_reaches_all_matching_listeners() {
        let bus = EventBus::new(chrono::Duration::hours(24), Duration::from_secs(1));
        let listener = Arc::new(CountingListener { count: AtomicUsize::new(0) });
        bus.register(listener.clone());
        let event = Event::new(EventType::Normal, "Scheduled", "msg", ws(), "placement-engine");
        let errs = bus.notify(&event).await;
        assert!(errs.is_empty());
        assert_eq!(listener.count.load(Ordering::SeqCst), 1);
    }

    struct PanickingListener;

    #[async_trait::async_trait]
    impl Listener for PanickingListener {
        fn name(&self) -> &'static str {
            "panicker"
        }
        fn types(&self) -> &[EventType] {
            &[]
        }
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn panicking_listener_surfaces_as_error_not_unwind() {
        let bus = EventBus::new(chrono::Duration::hours(24), Duration::from_secs(1));
        bus.register(Arc::new(PanickingListener));
        let event = Event::new(EventType::Error, "SyncFailed", "msg", ws(), "syncer");
        let errs = bus.notify(&event).await;
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], EventError::ListenerPanicked(..)));
    }
}
