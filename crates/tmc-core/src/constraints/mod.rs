//! # Constraint Engine (spec.md §4.C)
//!
//! Polymorphic over `{Affinity, AntiAffinity, Topology, Resource}`, extensible by
//! registering a new [`evaluators::ConstraintEvaluator`] under a new
//! [`types::ConstraintKind`] in [`engine::ConstraintEngine`].

pub mod engine;
pub mod evaluators;
pub mod types;

pub use engine::{ConstraintEngine, ConstraintError};
pub use evaluators::{AffinityEvaluator, AntiAffinityEvaluator, ConstraintEvaluator, ResourceEvaluator, TopologyEvaluator};
pub use types::{ClusterEvaluation, Conflict, Constraint, ConstraintKind, EnforcementMode, Evaluation, Scope};
