//! Health monitor: heartbeat lease loop + component-check aggregation loop
//! (spec.md §4.G).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use super::checks::{aggregate, ComponentCheck, HealthState};
use super::lease::{Lease, LeaseError, LeaseStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),
}

const CHECK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Metrics {
    sync_count: AtomicU64,
    error_count: AtomicU64,
}

/// Drives one target's heartbeat lease and the system-wide component-check
/// aggregation loop (spec.md §4.G).
pub struct HealthMonitor {
    leases: LeaseStore,
    target: String,
    namespace: String,
    holder_identity: String,
    heartbeat_interval: Duration,
    lease_duration: Duration,
    failure_threshold: u32,
    consecutive_failures: AtomicU64,
    checks: RwLock<Vec<Arc<dyn ComponentCheck>>>,
    aggregate_state: RwLock<HealthState>,
    metrics: Metrics,
    started_at: std::time::Instant,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        leases: LeaseStore,
        target: impl Into<String>,
        namespace: impl Into<String>,
        holder_identity: impl Into<String>,
        heartbeat_interval: Duration,
        lease_duration: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            leases,
            target: target.into(),
            namespace: namespace.into(),
            holder_identity: holder_identity.into(),
            heartbeat_interval,
            lease_duration,
            failure_threshold,
            consecutive_failures: AtomicU64::new(0),
            checks: RwLock::new(Vec::new()),
            aggregate_state: RwLock::new(HealthState::Unknown),
            metrics: Metrics::default(),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn register_check(&self, check: Arc<dyn ComponentCheck>) {
        self.checks.write().expect("health checks lock poisoned").push(check);
    }

    /// Touches the lease's `renewTime`; on repeated failure past
    /// `failure_threshold`, marks the syncer unhealthy (spec.md §4.G).
    pub async fn heartbeat_once(&self) -> bool {
        let lease = Lease {
            name: Lease::heartbeat_name(&self.target),
            namespace: self.namespace.clone(),
            holder_identity: self.holder_identity.clone(),
            lease_duration: self.lease_duration,
            renew_time: chrono::Utc::now(),
        };
        match self.leases.renew(&lease).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!(target = %self.target, error = %e, "lease renewal failed");
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures as u32 >= self.failure_threshold {
                    warn!(target = %self.target, "syncer marked unhealthy after repeated lease renewal failure");
                    *self.aggregate_state.write().expect("health state lock poisoned") = HealthState::Unhealthy;
                }
                false
            }
        }
    }

    pub async fn run_heartbeat_loop(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => { self.heartbeat_once().await; }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Runs every registered check under [`CHECK_DEADLINE`], aggregates per
    /// spec.md §8, and records the result.
    pub async fn run_checks_once(&self) -> HealthState {
        let checks: Vec<Arc<dyn ComponentCheck>> = self.checks.read().expect("health checks lock poisoned").clone();
        let mut states = Vec::with_capacity(checks.len());
        for check in &checks {
            let state = if let Ok(state) = tokio::time::timeout(CHECK_DEADLINE, check.check()).await { state } else {
                warn!(check = check.name(), "component check exceeded deadline");
                HealthState::Unhealthy
            };
            states.push(state);
        }
        let aggregated = aggregate(&states);
        *self.aggregate_state.write().expect("health state lock poisoned") = aggregated;
        aggregated
    }

    pub async fn run_checks_loop(&self, interval: Duration, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => { self.run_checks_once().await; }
                _ = shutdown.recv() => break,
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        *self.aggregate_state.read().expect("health state lock poisoned")
    }

    pub fn record_sync(&self) {
        self.metrics.sync_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.metrics.error_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sync_rate(&self) -> f64 {
        let uptime = self.started_at.elapsed().as_secs_f64().max(1.0);
        self.metrics.sync_count.load(Ordering::Relaxed) as f64 / uptime
    }

    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let syncs = self.metrics.sync_count.load(Ordering::Relaxed) as f64;
        let errors = self.metrics.error_count.load(Ordering::Relaxed) as f64;
        if syncs + errors == 0.0 {
            return 0.0;
        }
        errors / (syncs + errors)
    }

    #[must_use]
    pub fn liveness_probe(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    #[must_use]
    pub fn readiness_probe(&self) -> bool {
        self.state() == HealthState::Healthy
    }

    /// Releases this monitor's heartbeat lease (spec.md §5 graceful shutdown
    /// close order: "release leases" before the event bus shuts down).
    pub async fn release_lease(&self) -> Result<(), HealthError> {
        self.leases.release(&self.namespace, &Lease::heartbeat_name(&self.target)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    struct FixedCheck(HealthState);

    #[async_trait::async_trait]
    impl ComponentCheck for FixedCheck {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn check(&self) -> HealthState {
            self.0
        }
    }

    async fn monitor() -> HealthMonitor {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let leases = LeaseStore::new(pool).await.unwrap();
        HealthMonitor::new(leases, "east-1", "tmc-system", "controller-a", Duration::from_secs(10), Duration::from_secs(30), 3)
    }

    #[tokio::test]
    async fn heartbeat_once_succeeds_against_live_store() {
        let m = monitor().await;
        assert!(m.heartbeat_once().await);
    }

    #[tokio::test]
    async fn liveness_fails_only_when_unhealthy() {
        let m = monitor().await;
        m.register_check(Arc::new(FixedCheck(HealthState::Degraded)));
        let state = m.run_checks_once().await;
        assert_eq!(state, HealthState::Degraded);
        assert!(m.liveness_probe());
        assert!(!m.readiness_probe());
    }

    #[tokio::test]
    async fn readiness_requires_fully_healthy() {
        let m = monitor().await;
        m.register_check(Arc::new(FixedCheck(HealthState::Healthy)));
        m.run_checks_once().await;
        assert!(m.readiness_probe());
    }

    #[tokio::test]
    async fn error_and_sync_rate_track_recorded_events() {
        let m = monitor().await;
        m.record_sync();
        m.record_sync();
        m.record_error();
        assert!((m.error_rate() - (1.0 / 3.0)).abs() < 1e-9);
    }
}
