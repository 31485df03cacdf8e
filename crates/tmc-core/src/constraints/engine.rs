//! Constraint engine: registry of evaluators, per-cluster aggregation, and
//! conflict detection (spec.md §4.C).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cluster::{Cluster, WorkloadSelector};

use super::evaluators::{AffinityEvaluator, AntiAffinityEvaluator, ConstraintEvaluator, ResourceEvaluator, TopologyEvaluator};
use super::types::{ClusterEvaluation, Conflict, Constraint, ConstraintKind, EnforcementMode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("no evaluator registered for constraint kind {0}")]
    UnknownKind(String),
}

/// Open-closed registry of evaluators keyed by [`ConstraintKind`], matching design
/// note §9 ("dynamic plugin chains... a registry mapping a kind token to a
/// capability-conforming handler").
pub struct ConstraintEngine {
    evaluators: HashMap<ConstraintKind, Arc<dyn ConstraintEvaluator>>,
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        let mut engine = Self { evaluators: HashMap::new() };
        engine.register(Arc::new(AffinityEvaluator));
        engine.register(Arc::new(AntiAffinityEvaluator));
        engine.register(Arc::new(TopologyEvaluator));
        engine.register(Arc::new(ResourceEvaluator));
        engine
    }
}

impl ConstraintEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { evaluators: HashMap::new() }
    }

    pub fn register(&mut self, evaluator: Arc<dyn ConstraintEvaluator>) {
        self.evaluators.insert(evaluator.kind(), evaluator);
    }

    /// Evaluates every constraint in `constraints` against `cluster` — callers are
    /// expected to have already filtered `constraints` down to the ones whose
    /// workload selector matches the workload under placement (spec.md §4.C
    /// "workload selector must match") before calling this. Aggregates
    /// `Σ(weight·score) / Σ(weight)`, and marks the cluster unsuitable under
    /// `Strict` enforcement if any constraint is unsatisfied.
    pub fn evaluate_cluster(
        &self,
        constraints: &[Constraint],
        cluster: &Cluster,
        _workload: &WorkloadSelector,
    ) -> Result<ClusterEvaluation, ConstraintError> {
        let mut evaluations = Vec::new();
        let mut suitable = true;
        for constraint in constraints {
            let evaluator = self
                .evaluators
                .get(&constraint.kind)
                .ok_or_else(|| ConstraintError::UnknownKind(constraint.kind.to_string()))?;
            let eval = evaluator.evaluate(constraint, cluster);
            if constraint.enforcement == EnforcementMode::Strict && !eval.satisfied {
                suitable = false;
            }
            evaluations.push(eval);
        }

        let total_weight: f64 = evaluations.iter().map(|e| e.weight).sum();
        let aggregate_score = if total_weight > 0.0 {
            evaluations.iter().map(|e| e.weight * e.score).sum::<f64>() / total_weight
        } else {
            100.0
        };

        let conflicts = detect_conflicts(constraints);

        Ok(ClusterEvaluation { cluster: cluster.name.clone(), evaluations, aggregate_score, suitable, conflicts })
    }
}

/// When the constraint set contains both affinity and anti-affinity kinds, emits
/// an advisory `Contradictory` conflict — it does not drop the cluster, the scores
/// still govern (spec.md §4.C "Conflict detection").
fn detect_conflicts(constraints: &[Constraint]) -> Vec<Conflict> {
    let has_affinity = constraints.iter().any(|c| c.kind == ConstraintKind::Affinity);
    let has_anti_affinity = constraints.iter().any(|c| c.kind == ConstraintKind::AntiAffinity);
    if has_affinity && has_anti_affinity {
        vec![Conflict::Contradictory]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::types::Scope;
    use crate::ids::ClusterName;
    use std::collections::BTreeMap;

    fn cluster() -> Cluster {
        let mut c = Cluster::new(ClusterName::parse("east-1").unwrap(), "us-east");
        c.labels.insert("tier".into(), "gold".into());
        c.zones = vec!["z1".into(), "z2".into()];
        c
    }

    #[test]
    fn strict_unsatisfied_constraint_marks_unsuitable() {
        let engine = ConstraintEngine::default();
        let mut sel = BTreeMap::new();
        sel.insert("tier".into(), "platinum".into());
        let mut constraint = Constraint::affinity(Scope::Cluster, sel, 1.0);
        constraint.enforcement = EnforcementMode::Strict;
        let result = engine.evaluate_cluster(&[constraint], &cluster(), &crate::cluster::WorkloadSelector::default()).unwrap();
        assert!(!result.suitable);
    }

    #[test]
    fn contradictory_conflict_is_advisory_only() {
        let engine = ConstraintEngine::default();
        let affinity = Constraint::affinity(Scope::Cluster, BTreeMap::new(), 1.0);
        let anti = Constraint::anti_affinity(Scope::Cluster, BTreeMap::new(), 1.0);
        let result = engine
            .evaluate_cluster(&[affinity, anti], &cluster(), &crate::cluster::WorkloadSelector::default())
            .unwrap();
        assert!(result.conflicts.contains(&Conflict::Contradictory));
        assert!(result.suitable, "advisory conflict must not drop the cluster");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let engine = ConstraintEngine::new(); // no evaluators registered
        let constraint = Constraint::affinity(Scope::Cluster, BTreeMap::new(), 1.0);
        let err = engine.evaluate_cluster(&[constraint], &cluster(), &crate::cluster::WorkloadSelector::default());
        assert!(err.is_err());
    }
}
