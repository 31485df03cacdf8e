//! Quota data model (spec.md §3 "Quota status", §4.E).

use crate::cluster::ResourceMap;
use crate::ids::WorkspaceName;

/// Hard resource limits for one workspace, as set by `SetWorkspaceQuota`.
#[derive(Debug, Clone, Default)]
pub struct QuotaSpec {
    pub hard: ResourceMap,
}

/// A single resource over its hard limit (`used > hard`, burst not in effect).
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub resource: String,
    pub hard: f64,
    pub used: f64,
}

/// Point-in-time quota state for one workspace (spec.md §3 invariant:
/// `utilization = min(100%, used/hard)`; a violation exists iff `used > hard`
/// and burst is not in effect).
#[derive(Debug, Clone, Default)]
pub struct QuotaStatus {
    pub hard: ResourceMap,
    pub used: ResourceMap,
    /// Per-resource utilization percentage, capped at 100.
    pub utilization: ResourceMap,
    pub violations: Vec<Violation>,
    pub burst_allowed: bool,
}

/// A request to allocate `requested` resources against a workspace's quota.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub workspace: WorkspaceName,
    pub requested: ResourceMap,
    /// Caller opts in to burst; still requires the workspace to have
    /// `burstAllowed` set for the burst multiplier to apply.
    pub allow_burst: bool,
}

/// Outcome of `RequestAllocation` (spec.md §4.E).
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    pub approved: bool,
    pub allocated: ResourceMap,
    pub reason: Option<String>,
}
