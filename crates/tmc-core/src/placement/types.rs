//! Placement request/decision types (spec.md §3, §4.D).

use chrono::{DateTime, Utc};

use crate::cluster::WorkloadSelector;
use crate::constraints::Constraint;
use crate::ids::{ClusterName, PlacementId, WorkspaceName};

/// Cluster selection strategy (spec.md §3, §4.D's strategy table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Strategy {
    RoundRobin,
    LeastLoaded,
    Random,
    LocationAware,
    FairShare,
    FirstFit,
    BestFit,
}

/// A declarative placement request (spec.md §3 "Placement request").
///
/// Immutable once accepted except through a new `generation`.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    pub id: PlacementId,
    pub workspace: WorkspaceName,
    pub generation: u64,
    pub workload_selector: WorkloadSelector,
    pub location_filter: Option<Vec<String>>,
    pub constraints: Vec<Constraint>,
    pub strategy: Strategy,
    pub replicas: u32,
    pub traffic_percent: u8,
    pub progress_deadline: std::time::Duration,
}

/// Per-cluster scoring breakdown (spec.md §4.D step 3).
#[derive(Debug, Clone, Default)]
pub struct ScoreDetails {
    pub affinity: f64,
    pub capacity: f64,
    pub spread: f64,
    pub latency: f64,
}

/// Relative weight of each scoring component (spec.md §6 "Placement" config).
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub affinity: f64,
    pub capacity: f64,
    pub spread: f64,
    pub latency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { affinity: 1.0, capacity: 1.0, spread: 1.0, latency: 1.0 }
    }
}

impl ScoringWeights {
    #[must_use]
    pub fn merge(&self, details: &ScoreDetails) -> f64 {
        let total = self.affinity + self.capacity + self.spread + self.latency;
        if total <= 0.0 {
            return 0.0;
        }
        self.latency.mul_add(details.latency, self.spread.mul_add(details.spread, self.affinity.mul_add(details.affinity, self.capacity * details.capacity)))
            / total
    }
}

/// A candidate cluster after filtering, scoring, and merging (before selection).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub cluster: ClusterName,
    pub location: String,
    pub workload_count: u32,
    pub score: f64,
    pub details: ScoreDetails,
    pub suitable: bool,
    /// Average resource utilization (spec.md §4.D/§4.E `FairShare`: lowest wins).
    pub utilization: f64,
    /// Unused slack `Σ(available−requested)` (spec.md §4.D/§4.E `BestFit`: lowest wins).
    pub slack: f64,
}

/// The placement engine's output (spec.md §3 "Placement decision").
#[derive(Debug, Clone)]
pub struct PlacementDecision {
    pub generation: u64,
    pub selected_clusters: Vec<ClusterName>,
    pub score: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
