//! Constraint and evaluation types (spec.md §4.C).

use crate::cluster::ResourceMap;
use std::collections::BTreeMap;

/// The scope a constraint applies at, per spec.md §4.C's scoring tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Zone,
    Node,
}

/// How strictly a constraint set is enforced when evaluating a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Any unsatisfied constraint marks the cluster unsuitable.
    Strict,
    /// Unsatisfied constraints only lower the score.
    Soft,
}

/// A single placement constraint (spec.md §3 "constraints[]").
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub label_selector: BTreeMap<String, String>,
    pub scope: Scope,
    pub topology_key: Option<String>,
    pub max_skew: Option<u32>,
    pub requested: ResourceMap,
    pub weight: f64,
    pub enforcement: EnforcementMode,
}

impl Constraint {
    #[must_use]
    pub const fn affinity(scope: Scope, label_selector: BTreeMap<String, String>, weight: f64) -> Self {
        Self {
            kind: ConstraintKind::Affinity,
            label_selector,
            scope,
            topology_key: None,
            max_skew: None,
            requested: ResourceMap::new(),
            weight,
            enforcement: EnforcementMode::Soft,
        }
    }

    #[must_use]
    pub fn anti_affinity(scope: Scope, label_selector: BTreeMap<String, String>, weight: f64) -> Self {
        Self { kind: ConstraintKind::AntiAffinity, ..Self::affinity(scope, label_selector, weight) }
    }

    #[must_use]
    pub fn topology(topology_key: impl Into<String>, max_skew: u32, weight: f64) -> Self {
        Self {
            kind: ConstraintKind::Topology,
            label_selector: BTreeMap::new(),
            scope: Scope::Zone,
            topology_key: Some(topology_key.into()),
            max_skew: Some(max_skew),
            requested: ResourceMap::new(),
            weight,
            enforcement: EnforcementMode::Soft,
        }
    }

    #[must_use]
    pub const fn resource(requested: ResourceMap, weight: f64) -> Self {
        Self {
            kind: ConstraintKind::Resource,
            label_selector: BTreeMap::new(),
            scope: Scope::Cluster,
            topology_key: None,
            max_skew: None,
            requested,
            weight,
            enforcement: EnforcementMode::Soft,
        }
    }
}

/// The four constraint kinds the engine evaluates (spec.md §4.C); extensible by
/// registering a new [`super::engine::ConstraintEvaluator`] under a new kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ConstraintKind {
    Affinity,
    AntiAffinity,
    Topology,
    Resource,
}

/// A single constraint's evaluation against one cluster (spec.md §4.C contract).
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub kind: ConstraintKind,
    pub score: f64,
    pub satisfied: bool,
    pub reason: String,
    pub weight: f64,
}

/// The full result of evaluating every applicable constraint against one cluster.
#[derive(Debug, Clone)]
pub struct ClusterEvaluation {
    pub cluster: crate::ids::ClusterName,
    pub evaluations: Vec<Evaluation>,
    pub aggregate_score: f64,
    pub suitable: bool,
    pub conflicts: Vec<Conflict>,
}

/// An advisory conflict detected across the constraint set (spec.md §4.C
/// "Conflict detection"). Advisory: does not drop the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Both affinity and anti-affinity constraints are present for the same set.
    Contradictory,
}
