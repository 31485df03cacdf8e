//! Component health checks and aggregation (spec.md §4.G).

use async_trait::async_trait;

/// Health of one component or the aggregate system (spec.md §8 "Health
/// aggregation: `Unhealthy > Degraded > Healthy > Unknown` is monotonic").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

/// One pluggable health probe, run under a per-check deadline (spec.md §4.G
/// "invoke all registered `ComponentChecks`, each under a 5s per-check
/// deadline").
#[async_trait]
pub trait ComponentCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> HealthState;
}

/// Aggregates component states: any `Unhealthy` dominates; otherwise any
/// `Degraded` dominates; else `Healthy`; empty input is `Unknown`.
#[must_use]
pub fn aggregate(states: &[HealthState]) -> HealthState {
    states.iter().copied().max().unwrap_or(HealthState::Unknown)
}
