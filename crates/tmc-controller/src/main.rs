//! TMC control-plane process entry point: loads configuration, bootstraps
//! tracing, wires `tmc-core`/`tmc-orchestrator` into a running reconcile
//! controller, and drives graceful shutdown (spec.md §5, §7).

mod collaborators;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tmc_core::events::EventBus;
use tmc_core::health::{HealthMonitor, LeaseStore};
use tmc_core::placement::PlacementEngine;
use tmc_core::queue::WorkQueue;
use tmc_core::quota::QuotaManager;
use tmc_core::sync::{SyncerCore, TransformChain};
use tmc_orchestrator::{CoreServices, ReconcileController};

use collaborators::{InMemoryClusterRegistry, InMemoryPlacementStore};

#[derive(Debug, Parser)]
#[command(name = "tmc-controller", version, about = "TMC multi-cluster placement control plane")]
struct Cli {
    /// Path to a TOML config file. Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `queue.worker_count` from the config file.
    #[arg(long)]
    worker_count: Option<usize>,
}

fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(err) = result {
        eprintln!("failed to initialize tracing subscriber: {err}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let explicit_config = cli.config.is_some();
    let mut cfg = config::load(cli.config.as_deref(), explicit_config)?;
    if let Some(worker_count) = cli.worker_count {
        cfg.queue.worker_count = worker_count;
    }

    tracing::info!(worker_count = cfg.queue.worker_count, "starting tmc-controller");

    let queue = Arc::new(WorkQueue::new(cfg.queue.name.clone(), cfg.queue.retry_policy(), tmc_core::queue::CircuitBreaker::new(cfg.queue.circuit_breaker())));
    let events = Arc::new(EventBus::new(chrono::Duration::hours(1), Duration::from_secs(5)));
    let placement = Arc::new(PlacementEngine::new(cfg.placement.scoring_weights(), cfg.placement.rng_seed));
    let quota = Arc::new(QuotaManager::new(cfg.quota.max_burst_multiplier));
    let syncer = Arc::new(SyncerCore::new(TransformChain::default(), cfg.syncer.conflict_resolution.into(), cfg.queue.retry_policy()));

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(sqlx::sqlite::SqliteConnectOptions::new().filename(&cfg.health.lease_db_path).create_if_missing(true))
        .await?;
    let leases = LeaseStore::new(pool).await?;
    let health = Arc::new(HealthMonitor::new(
        leases,
        "reconcile-controller",
        cfg.health.lease_namespace.clone(),
        hostname_identity(),
        Duration::from_secs(cfg.health.heartbeat_interval_secs),
        Duration::from_secs(cfg.health.heartbeat_interval_secs * 3),
        cfg.health.failure_threshold,
    ));

    let registry = Arc::new(InMemoryClusterRegistry::new(Vec::new()));
    let store = Arc::new(InMemoryPlacementStore::new(Vec::new()));

    let services = CoreServices::new(queue, events, placement, quota, syncer, health, registry, store);
    let controller = Arc::new(ReconcileController::new(services.clone(), cfg.queue.worker_count, cfg.queue.retry_policy()));

    let (ambient_shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let (controller_shutdown_tx, controller_shutdown_rx) = tokio::sync::watch::channel(false);

    let health_loop = tokio::spawn({
        let health = Arc::clone(&services.health);
        let rx = ambient_shutdown_tx.subscribe();
        async move { health.run_heartbeat_loop(rx).await }
    });
    let health_checks_loop = tokio::spawn({
        let health = Arc::clone(&services.health);
        let rx = ambient_shutdown_tx.subscribe();
        let interval = Duration::from_secs(cfg.health.checks_interval_secs);
        async move { health.run_checks_loop(interval, rx).await }
    });
    let quota_loop = tokio::spawn({
        let quota = Arc::clone(&services.quota);
        let rx = ambient_shutdown_tx.subscribe();
        let interval = Duration::from_secs(cfg.quota.aggregation_interval_secs);
        async move { quota.run_aggregation_loop(interval, rx).await }
    });
    let quota_violation_loop = tokio::spawn({
        let quota = Arc::clone(&services.quota);
        let rx = ambient_shutdown_tx.subscribe();
        let interval = Duration::from_secs(cfg.quota.violation_scan_interval_secs);
        async move { quota.run_violation_scan_loop(interval, rx).await }
    });
    let worker_pool = tokio::spawn(Arc::clone(&controller).run(controller_shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, draining");

    // Graceful shutdown close order (spec.md §5): stop admitting new work,
    // drain in-flight workers within shutdownTimeout, stop the health loop,
    // release leases, shut down the event bus.
    services.queue.shut_down();
    controller_shutdown_tx.send(true).ok();
    let drain = tokio::time::timeout(Duration::from_secs(cfg.queue.shutdown_timeout_secs), worker_pool).await;
    if drain.is_err() {
        tracing::warn!("worker pool did not drain within shutdownTimeout");
    }

    ambient_shutdown_tx.send(()).ok();
    health_loop.await.ok();
    health_checks_loop.await.ok();
    quota_loop.await.ok();
    quota_violation_loop.await.ok();

    if let Err(err) = services.health.release_lease().await {
        tracing::warn!(error = %err, "failed to release heartbeat lease during shutdown");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn hostname_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "tmc-controller".into())
}
