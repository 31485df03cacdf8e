//! `CoreServices` — the `Arc`-held handles to A–G that the reconcile
//! controller drives (spec.md §4.H ambient note: "no process-wide singletons
//! beyond the metrics registry").

use std::sync::Arc;

use tmc_core::events::EventBus;
use tmc_core::health::HealthMonitor;
use tmc_core::placement::PlacementEngine;
use tmc_core::queue::WorkQueue;
use tmc_core::quota::QuotaManager;
use tmc_core::sync::SyncerCore;
use tmc_core::{ClusterRegistry, PlacementStore};

/// A plain struct of shared handles into the A–G components, passed by
/// reference to every worker in the reconcile pool.
#[derive(Clone)]
pub struct CoreServices {
    pub queue: Arc<WorkQueue>,
    pub events: Arc<EventBus>,
    pub placement: Arc<PlacementEngine>,
    pub quota: Arc<QuotaManager>,
    pub syncer: Arc<SyncerCore>,
    pub health: Arc<HealthMonitor>,
    pub registry: Arc<dyn ClusterRegistry>,
    pub store: Arc<dyn PlacementStore>,
}

impl CoreServices {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<WorkQueue>,
        events: Arc<EventBus>,
        placement: Arc<PlacementEngine>,
        quota: Arc<QuotaManager>,
        syncer: Arc<SyncerCore>,
        health: Arc<HealthMonitor>,
        registry: Arc<dyn ClusterRegistry>,
        store: Arc<dyn PlacementStore>,
    ) -> Self {
        Self { queue, events, placement, quota, syncer, health, registry, store }
    }
}
