//! # Placement Engine (spec.md §4.D)
//!
//! Turns a declarative [`types::PlacementRequest`] into a [`types::PlacementDecision`]
//! by fetching candidate clusters, scoring them against constraints, and selecting
//! among them per one of seven [`types::Strategy`] values.

pub mod engine;
pub mod strategies;
pub mod types;

pub use engine::{PlacementEngine, PlacementError};
pub use strategies::select;
pub use types::{Candidate, PlacementDecision, PlacementRequest, ScoreDetails, ScoringWeights, Strategy};
