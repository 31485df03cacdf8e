//! # Quota Manager (spec.md §4.E)
//!
//! Hierarchical usage/limit accounting for workspaces. Gates allocations before
//! the placement decision is materialized, and selects among already-suitable
//! clusters (`FairShare`/`FirstFit`/`BestFit`) when quota — not placement scoring
//! — is the deciding factor.

pub mod manager;
pub mod types;

pub use manager::{QuotaError, QuotaListener, QuotaManager};
pub use types::{AllocationRequest, AllocationResult, QuotaSpec, QuotaStatus, Violation};
