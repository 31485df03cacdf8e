//! Cluster and resource types shared across the constraint engine, placement
//! engine, and quota manager (spec.md §3 "Cluster record").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::ids::ClusterName;

/// A named, quantifiable resource kind (cpu, memory, storage, ...). Kept as a
/// `String` rather than a closed enum because the set of accounted resources is a
/// deployment-time configuration choice, not a compile-time constant.
pub type ResourceName = String;

/// A resource quantity map, e.g. `{"cpu": 4000.0, "memory": 16384.0}`. Units are
/// caller-defined (millicores, MiB, ...); the engine only ever compares like units.
pub type ResourceMap = BTreeMap<ResourceName, f64>;

/// A registered cluster (spec.md §3). Invariant: `available = capacity − allocated`
/// per resource, enforced by [`Cluster::recompute_available`] rather than trusted
/// on construction.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: ClusterName,
    pub location: String,
    pub labels: BTreeMap<String, String>,
    pub zones: Vec<String>,
    pub capacity: ResourceMap,
    pub allocated: ResourceMap,
    pub available: ResourceMap,
    pub healthy: bool,
    pub last_heartbeat: DateTime<Utc>,
    /// Number of workloads currently placed on this cluster (used by `LeastLoaded`).
    pub workload_count: u32,
}

impl Cluster {
    #[must_use]
    pub fn new(name: ClusterName, location: impl Into<String>) -> Self {
        let mut c = Self {
            name,
            location: location.into(),
            labels: BTreeMap::new(),
            zones: Vec::new(),
            capacity: BTreeMap::new(),
            allocated: BTreeMap::new(),
            available: BTreeMap::new(),
            healthy: true,
            last_heartbeat: Utc::now(),
            workload_count: 0,
        };
        c.recompute_available();
        c
    }

    /// Restores the `available = capacity − allocated` invariant. Must be called
    /// after any mutation of `capacity` or `allocated`.
    pub fn recompute_available(&mut self) {
        self.available = self
            .capacity
            .iter()
            .map(|(k, cap)| (k.clone(), (cap - self.allocated.get(k).copied().unwrap_or(0.0)).max(0.0)))
            .collect();
    }

    /// Average utilization across all known capacity-bearing resources (used by
    /// the quota manager's `FairShare` strategy, spec.md §4.E).
    #[must_use]
    pub fn average_utilization(&self) -> f64 {
        if self.capacity.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .capacity
            .iter()
            .map(|(k, cap)| if *cap > 0.0 { self.allocated.get(k).copied().unwrap_or(0.0) / cap } else { 0.0 })
            .sum();
        sum / self.capacity.len() as f64
    }

    /// Whether this cluster has enough available capacity to satisfy `requested`.
    #[must_use]
    pub fn fits(&self, requested: &ResourceMap) -> bool {
        requested.iter().all(|(k, qty)| self.available.get(k).copied().unwrap_or(0.0) >= *qty)
    }

    /// Unused slack `Σ(available−requested)` across the resources in `requested`
    /// (spec.md §4.D/§4.E `BestFit`: minimize this across candidates).
    #[must_use]
    pub fn slack(&self, requested: &ResourceMap) -> f64 {
        requested.iter().map(|(k, qty)| self.available.get(k).copied().unwrap_or(0.0) - qty).sum()
    }
}

/// A workload's selection criteria, matched against cluster labels when evaluating
/// constraints (spec.md §4.C "workload selector must match").
#[derive(Debug, Clone, Default)]
pub struct WorkloadSelector {
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSelector {
    #[must_use]
    pub fn matches(&self, cluster_labels: &BTreeMap<String, String>) -> bool {
        self.labels.iter().all(|(k, v)| cluster_labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_tracks_capacity_minus_allocated() {
        let mut c = Cluster::new(ClusterName::parse("east-1").unwrap(), "us-east");
        c.capacity.insert("cpu".into(), 1000.0);
        c.allocated.insert("cpu".into(), 400.0);
        c.recompute_available();
        assert_eq!(c.available.get("cpu"), Some(&600.0));
    }

    #[test]
    fn fits_requires_every_requested_resource() {
        let mut c = Cluster::new(ClusterName::parse("east-1").unwrap(), "us-east");
        c.capacity.insert("cpu".into(), 1000.0);
        c.capacity.insert("memory".into(), 2000.0);
        c.recompute_available();
        let mut req = ResourceMap::new();
        req.insert("cpu".into(), 500.0);
        req.insert("memory".into(), 3000.0);
        assert!(!c.fits(&req));
    }
}
