//! Built-in constraint evaluators (spec.md §4.C).

use crate::cluster::Cluster;

use super::types::{Constraint, ConstraintKind, Evaluation, Scope};

/// The evaluation contract every constraint kind implements: `Evaluate(constraint,
/// cluster, workload) → {type, score∈[0..100], satisfied, reason, weight}`.
pub trait ConstraintEvaluator: Send + Sync {
    fn kind(&self) -> ConstraintKind;
    fn evaluate(&self, constraint: &Constraint, cluster: &Cluster) -> Evaluation;
}

/// `Affinity`: satisfied (score 100) iff cluster labels match the selector, scaled
/// by scope.
pub struct AffinityEvaluator;

impl ConstraintEvaluator for AffinityEvaluator {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Affinity
    }

    fn evaluate(&self, constraint: &Constraint, cluster: &Cluster) -> Evaluation {
        let matches = constraint.label_selector.iter().all(|(k, v)| cluster.labels.get(k) == Some(v));
        let (score, reason) = match constraint.scope {
            Scope::Cluster => (100.0, "cluster-scoped affinity always satisfied"),
            Scope::Zone if !cluster.zones.is_empty() => (100.0, "zone present, affinity satisfied"),
            Scope::Zone => (0.0, "no zones registered for cluster"),
            Scope::Node => (90.0, "node-scoped affinity satisfied"),
        };
        if matches {
            Evaluation { kind: self.kind(), score, satisfied: true, reason: reason.into(), weight: constraint.weight }
        } else {
            Evaluation {
                kind: self.kind(),
                score: 0.0,
                satisfied: false,
                reason: "cluster labels do not match selector".into(),
                weight: constraint.weight,
            }
        }
    }
}

/// `AntiAffinity`: satisfied (score 100) iff labels do *not* match; zone scope
/// rewards spreading across more than one zone.
pub struct AntiAffinityEvaluator;

impl ConstraintEvaluator for AntiAffinityEvaluator {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::AntiAffinity
    }

    fn evaluate(&self, constraint: &Constraint, cluster: &Cluster) -> Evaluation {
        // Zone scope rewards spreading regardless of label match (spec.md §4.C
        // "Scope Zone rewards multi-zone"); other scopes gate on the label
        // selector not matching the cluster.
        if constraint.scope == Scope::Zone {
            let (score, reason) = if cluster.zones.len() > 1 {
                (100.0, "multi-zone cluster rewarded")
            } else {
                (30.0, "single zone, anti-affinity spread not achieved")
            };
            return Evaluation { kind: self.kind(), score, satisfied: true, reason: reason.into(), weight: constraint.weight };
        }

        let matches = constraint.label_selector.iter().all(|(k, v)| cluster.labels.get(k) == Some(v));
        if matches {
            return Evaluation {
                kind: self.kind(),
                score: 0.0,
                satisfied: false,
                reason: "cluster labels match the excluded selector".into(),
                weight: constraint.weight,
            };
        }
        Evaluation { kind: self.kind(), score: 100.0, satisfied: true, reason: "labels excluded, constraint satisfied".into(), weight: constraint.weight }
    }
}

/// `Topology`: requires a non-empty `topologyKey`; `zone` keys are scored by zone
/// count and `maxSkew`, custom keys by label presence.
pub struct TopologyEvaluator;

impl ConstraintEvaluator for TopologyEvaluator {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Topology
    }

    fn evaluate(&self, constraint: &Constraint, cluster: &Cluster) -> Evaluation {
        let Some(key) = constraint.topology_key.as_deref().filter(|k| !k.is_empty()) else {
            return Evaluation {
                kind: self.kind(),
                score: 0.0,
                satisfied: false,
                reason: "topologyKey must be non-empty".into(),
                weight: constraint.weight,
            };
        };
        if key == "zone" {
            let zones = cluster.zones.len();
            let max_skew = constraint.max_skew.unwrap_or(0);
            return match zones {
                0 => Evaluation { kind: self.kind(), score: 0.0, satisfied: false, reason: "cluster has no zones".into(), weight: constraint.weight },
                1 => {
                    let satisfied = max_skew >= 1;
                    Evaluation {
                        kind: self.kind(),
                        score: 50.0,
                        satisfied,
                        reason: format!("single zone, maxSkew={max_skew}"),
                        weight: constraint.weight,
                    }
                }
                _ => Evaluation { kind: self.kind(), score: 100.0, satisfied: true, reason: "multi-zone cluster".into(), weight: constraint.weight },
            };
        }
        let present = cluster.labels.contains_key(key);
        Evaluation {
            kind: self.kind(),
            score: if present { 80.0 } else { 20.0 },
            satisfied: present,
            reason: format!("custom topology key '{key}' {}", if present { "present" } else { "absent" }),
            weight: constraint.weight,
        }
    }
}

/// `Resource`: weakest-link score across every requested resource, ratio
/// `available/required` scaled to 0–100 and capped at 100.
pub struct ResourceEvaluator;

impl ConstraintEvaluator for ResourceEvaluator {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Resource
    }

    fn evaluate(&self, constraint: &Constraint, cluster: &Cluster) -> Evaluation {
        if constraint.requested.is_empty() {
            return Evaluation { kind: self.kind(), score: 100.0, satisfied: true, reason: "no resources requested".into(), weight: constraint.weight };
        }
        let mut worst = f64::MAX;
        for (name, required) in &constraint.requested {
            let available = cluster.available.get(name).copied().unwrap_or(0.0);
            let ratio = if *required <= 0.0 { 100.0 } else { (available / required * 100.0).min(100.0).max(0.0) };
            worst = worst.min(ratio);
        }
        let worst = if worst == f64::MAX { 100.0 } else { worst };
        Evaluation {
            kind: self.kind(),
            score: worst,
            satisfied: worst >= 100.0,
            reason: format!("weakest-link resource score {worst:.1}"),
            weight: constraint.weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ResourceMap;
    use crate::ids::ClusterName;
    use std::collections::BTreeMap;

    fn cluster() -> Cluster {
        let mut c = Cluster::new(ClusterName::parse("east-1").unwrap(), "us-east");
        c.labels.insert("tier".into(), "gold".into());
        c.zones = vec!["z1".into(), "z2".into()];
        c.capacity.insert("cpu".into(), 1000.0);
        c.allocated.insert("cpu".into(), 200.0);
        c.recompute_available();
        c
    }

    #[test]
    fn affinity_matches_scores_100_for_cluster_scope() {
        let mut sel = BTreeMap::new();
        sel.insert("tier".into(), "gold".into());
        let constraint = Constraint::affinity(Scope::Cluster, sel, 1.0);
        let eval = AffinityEvaluator.evaluate(&constraint, &cluster());
        assert!(eval.satisfied);
        assert_eq!(eval.score, 100.0);
    }

    #[test]
    fn anti_affinity_rewards_multi_zone() {
        let sel = BTreeMap::new();
        let constraint = Constraint::anti_affinity(Scope::Zone, sel, 1.0);
        let eval = AntiAffinityEvaluator.evaluate(&constraint, &cluster());
        assert_eq!(eval.score, 100.0);
    }

    #[test]
    fn topology_zone_single_zone_scores_50() {
        let mut c = cluster();
        c.zones = vec!["z1".into()];
        let constraint = Constraint::topology("zone", 1, 1.0);
        let eval = TopologyEvaluator.evaluate(&constraint, &c);
        assert_eq!(eval.score, 50.0);
        assert!(eval.satisfied);
    }

    #[test]
    fn resource_weakest_link_caps_at_100() {
        let mut requested = ResourceMap::new();
        requested.insert("cpu".into(), 400.0);
        let constraint = Constraint::resource(requested, 1.0);
        let eval = ResourceEvaluator.evaluate(&constraint, &cluster());
        assert_eq!(eval.score, 100.0);
    }
}
