//! Placement engine pipeline (spec.md §4.D).

use thiserror::Error;

use crate::cluster::Cluster;
use crate::constraints::ConstraintEngine;
use crate::external::{ClusterRegistry, RegistryError};

use super::strategies::select;
use super::types::{Candidate, PlacementDecision, PlacementRequest, ScoreDetails, ScoringWeights};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no candidate clusters available")]
    NoCandidates,

    #[error("all candidate clusters were unsuitable")]
    AllUnsuitable,

    #[error("unsupported strategy: {0}")]
    StrategyUnsupported(String),

    #[error("cluster registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl PlacementError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        match self {
            Self::NoCandidates | Self::AllUnsuitable | Self::StrategyUnsupported(_) => crate::error::ErrorKind::Invalid,
            Self::RegistryUnavailable(_) => crate::error::ErrorKind::Transient,
        }
    }
}

impl From<RegistryError> for PlacementError {
    fn from(e: RegistryError) -> Self {
        Self::RegistryUnavailable(e.to_string())
    }
}

/// Decides cluster placement for one request (spec.md §4.D's six-step pipeline).
pub struct PlacementEngine {
    pub constraint_engine: ConstraintEngine,
    pub weights: ScoringWeights,
    pub rng_seed: u64,
}

impl PlacementEngine {
    #[must_use]
    pub fn new(weights: ScoringWeights, rng_seed: u64) -> Self {
        Self { constraint_engine: ConstraintEngine::default(), weights, rng_seed }
    }

    pub async fn decide(
        &self,
        request: &PlacementRequest,
        registry: &dyn ClusterRegistry,
    ) -> Result<PlacementDecision, PlacementError> {
        // 1. Fetch candidates, discard unhealthy.
        let all = registry.get_available_clusters().await?;
        let healthy: Vec<Cluster> = all.into_iter().filter(|c| c.healthy).collect();
        if healthy.is_empty() {
            return Err(PlacementError::NoCandidates);
        }

        // 2. Filter by locationFilter if provided.
        let filtered: Vec<Cluster> = match &request.location_filter {
            Some(locations) if !locations.is_empty() => {
                healthy.into_iter().filter(|c| locations.contains(&c.location)).collect()
            }
            _ => healthy,
        };
        if filtered.is_empty() {
            return Err(PlacementError::NoCandidates);
        }

        // 3 & 4. Score via the constraint engine, then weighted-merge the four
        // component scores into one.
        let mut candidates = Vec::with_capacity(filtered.len());
        let max_workload_count = filtered.iter().map(|c| c.workload_count).max().unwrap_or(0).max(1);
        let requested = requested_resources(&request.constraints);
        for cluster in &filtered {
            let eval = self
                .constraint_engine
                .evaluate_cluster(&request.constraints, cluster, &request.workload_selector)
                .map_err(|_| PlacementError::AllUnsuitable)?;

            let affinity_evals: Vec<&crate::constraints::Evaluation> = eval
                .evaluations
                .iter()
                .filter(|e| e.kind != crate::constraints::ConstraintKind::Resource)
                .collect();
            let affinity = weighted_average(&affinity_evals);
            let capacity_evals: Vec<&crate::constraints::Evaluation> =
                eval.evaluations.iter().filter(|e| e.kind == crate::constraints::ConstraintKind::Resource).collect();
            let capacity = if capacity_evals.is_empty() { 100.0 } else { weighted_average(&capacity_evals) };
            let spread = 100.0 * (1.0 - f64::from(cluster.workload_count) / f64::from(max_workload_count));
            let latency = match &request.location_filter {
                Some(locations) if locations.first().map(String::as_str) == Some(cluster.location.as_str()) => 100.0,
                Some(_) => 70.0,
                None => 100.0,
            };

            let details = ScoreDetails { affinity, capacity, spread, latency };
            let score = self.weights.merge(&details);
            candidates.push(Candidate {
                cluster: cluster.name.clone(),
                location: cluster.location.clone(),
                workload_count: cluster.workload_count,
                score,
                details,
                suitable: eval.suitable,
                utilization: cluster.average_utilization(),
                slack: cluster.slack(&requested),
            });
        }

        // 5. Sort by score desc, tie-break by name asc.
        candidates.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.cluster.as_str().cmp(b.cluster.as_str()))
        });

        let suitable: Vec<Candidate> = candidates.into_iter().filter(|c| c.suitable).collect();
        if suitable.is_empty() {
            return Err(PlacementError::AllUnsuitable);
        }

        // 6. Select by strategy.
        let selected = select(request.strategy, &suitable, request.replicas, self.rng_seed);

        let reasons = selected
            .iter()
            .map(|c| format!("{}: score={:.1} (affinity={:.1} capacity={:.1} spread={:.1} latency={:.1})", c.cluster, c.score, c.details.affinity, c.details.capacity, c.details.spread, c.details.latency))
            .collect();
        let score = if selected.is_empty() { 0.0 } else { selected.iter().map(|c| c.score).sum::<f64>() / selected.len() as f64 };

        Ok(PlacementDecision {
            generation: request.generation,
            selected_clusters: selected.into_iter().map(|c| c.cluster).collect(),
            score,
            reasons,
            timestamp: chrono::Utc::now(),
        })
    }
}

/// Sums each constraint's `requested` resources into one map (spec.md §4.D
/// step 3 "scoring against requested quantities").
fn requested_resources(constraints: &[crate::constraints::Constraint]) -> crate::cluster::ResourceMap {
    let mut total = crate::cluster::ResourceMap::new();
    for constraint in constraints {
        for (resource, qty) in &constraint.requested {
            *total.entry(resource.clone()).or_insert(0.0) += qty;
        }
    }
    total
}

fn weighted_average(evals: &[&crate::constraints::Evaluation]) -> f64 {
    let total_weight: f64 = evals.iter().map(|e| e.weight).sum();
    if total_weight <= 0.0 {
        return 100.0;
    }
    evals.iter().map(|e| e.weight * e.score).sum::<f64>() / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::WorkloadSelector;
    use crate::ids::{ClusterName, PlacementId, WorkspaceName};
    use crate::placement::Strategy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeRegistry(Mutex<Vec<Cluster>>);

    #[async_trait]
    impl ClusterRegistry for FakeRegistry {
        async fn get_available_clusters(&self) -> Result<Vec<Cluster>, RegistryError> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn update_health(&self, _c: &ClusterName, _h: bool) -> Result<(), RegistryError> {
            Ok(())
        }
        async fn update_usage(&self, _c: &ClusterName, _a: crate::cluster::ResourceMap) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    fn cluster(name: &str) -> Cluster {
        Cluster::new(ClusterName::parse(name).unwrap(), "us")
    }

    fn request(strategy: Strategy, replicas: u32) -> PlacementRequest {
        PlacementRequest {
            id: PlacementId::parse("p1").unwrap(),
            workspace: WorkspaceName::parse("team:acme").unwrap(),
            generation: 1,
            workload_selector: WorkloadSelector::default(),
            location_filter: None,
            constraints: Vec::new(),
            strategy,
            replicas,
            traffic_percent: 100,
            progress_deadline: std::time::Duration::from_mins(1),
        }
    }

    #[tokio::test]
    async fn round_robin_happy_path_scenario_1() {
        let registry = FakeRegistry(Mutex::new(vec![cluster("a"), cluster("b"), cluster("c")]));
        let engine = PlacementEngine::new(ScoringWeights::default(), 0);
        let decision = engine.decide(&request(Strategy::RoundRobin, 2), &registry).await.unwrap();
        assert_eq!(decision.selected_clusters.iter().map(crate::ids::ClusterName::as_str).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_cluster_set_yields_no_candidates() {
        let registry = FakeRegistry(Mutex::new(vec![]));
        let engine = PlacementEngine::new(ScoringWeights::default(), 0);
        let err = engine.decide(&request(Strategy::RoundRobin, 2), &registry).await.unwrap_err();
        assert_eq!(err, PlacementError::NoCandidates);
    }

    #[tokio::test]
    async fn replicas_exceeding_healthy_candidates_returns_all_healthy() {
        let registry = FakeRegistry(Mutex::new(vec![cluster("a"), cluster("b")]));
        let engine = PlacementEngine::new(ScoringWeights::default(), 0);
        let decision = engine.decide(&request(Strategy::RoundRobin, 5), &registry).await.unwrap();
        assert_eq!(decision.selected_clusters.len(), 2);
    }

    #[tokio::test]
    async fn idempotent_given_identical_inputs_and_seed() {
        let registry = FakeRegistry(Mutex::new(vec![cluster("a"), cluster("b"), cluster("c"), cluster("d")]));
        let engine = PlacementEngine::new(ScoringWeights::default(), 7);
        let d1 = engine.decide(&request(Strategy::Random, 2), &registry).await.unwrap();
        let d2 = engine.decide(&request(Strategy::Random, 2), &registry).await.unwrap();
        assert_eq!(d1.selected_clusters, d2.selected_clusters);
    }
}
