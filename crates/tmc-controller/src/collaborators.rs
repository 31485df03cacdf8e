//! Default in-memory implementations of the external collaborator traits
//! (spec.md §6). The core treats `ClusterRegistry` and `PlacementStore` as
//! opaque; production deployments swap these for whatever speaks to the real
//! cluster fleet and placement-object store. This module exists so the
//! process has something to wire up and run end-to-end out of the box.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tmc_core::cluster::{Cluster, ResourceMap};
use tmc_core::external::{
    ClusterRegistry, PlacementSpec, PlacementStatus, PlacementStore, PlacementStoreError, RegistryError,
};
use tmc_core::ids::{ClusterName, PlacementId};

/// A `ClusterRegistry` backed by an in-process list, seeded at startup.
#[derive(Default)]
pub struct InMemoryClusterRegistry {
    clusters: RwLock<Vec<Cluster>>,
}

impl InMemoryClusterRegistry {
    #[must_use]
    pub const fn new(clusters: Vec<Cluster>) -> Self {
        Self { clusters: RwLock::new(clusters) }
    }
}

#[async_trait]
impl ClusterRegistry for InMemoryClusterRegistry {
    async fn get_available_clusters(&self) -> Result<Vec<Cluster>, RegistryError> {
        Ok(self.clusters.read().expect("cluster registry lock poisoned").clone())
    }

    async fn update_health(&self, cluster: &ClusterName, healthy: bool) -> Result<(), RegistryError> {
        let mut clusters = self.clusters.write().expect("cluster registry lock poisoned");
        let entry = clusters.iter_mut().find(|c| &c.name == cluster).ok_or_else(|| RegistryError::NotFound(cluster.clone()))?;
        entry.healthy = healthy;
        Ok(())
    }

    async fn update_usage(&self, cluster: &ClusterName, allocated: ResourceMap) -> Result<(), RegistryError> {
        let mut clusters = self.clusters.write().expect("cluster registry lock poisoned");
        let entry = clusters.iter_mut().find(|c| &c.name == cluster).ok_or_else(|| RegistryError::NotFound(cluster.clone()))?;
        entry.allocated = allocated;
        entry.recompute_available();
        Ok(())
    }
}

/// A `PlacementStore` backed by an in-process map, with optimistic-concurrency
/// status writes (spec.md §4.H step 5, §6 "Placement API").
#[derive(Default)]
pub struct InMemoryPlacementStore {
    specs: RwLock<HashMap<PlacementId, PlacementSpec>>,
    statuses: RwLock<HashMap<PlacementId, PlacementStatus>>,
}

impl InMemoryPlacementStore {
    #[must_use]
    pub fn new(specs: Vec<PlacementSpec>) -> Self {
        let specs = specs.into_iter().map(|spec| (spec.id.clone(), spec)).collect();
        Self { specs: RwLock::new(specs), statuses: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl PlacementStore for InMemoryPlacementStore {
    async fn get(&self, id: &PlacementId) -> Result<Option<PlacementSpec>, PlacementStoreError> {
        Ok(self.specs.read().expect("placement spec lock poisoned").get(id).cloned())
    }

    async fn write_status(&self, id: &PlacementId, expected_generation: u64, status: PlacementStatus) -> Result<(), PlacementStoreError> {
        let mut statuses = self.statuses.write().expect("placement status lock poisoned");
        if let Some(current) = statuses.get(id) {
            if current.observed_generation > expected_generation {
                return Err(PlacementStoreError::Conflict(id.clone()));
            }
        }
        statuses.insert(id.clone(), status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_status_conflicts_on_stale_generation() {
        let store = InMemoryPlacementStore::default();
        let id = PlacementId::parse("p1").unwrap();
        store.write_status(&id, 2, PlacementStatus { observed_generation: 2, ..Default::default() }).await.unwrap();
        let err = store.write_status(&id, 1, PlacementStatus::default()).await.unwrap_err();
        assert_eq!(err, PlacementStoreError::Conflict(id));
    }
}
