//! Configuration loading (spec.md §6 "Configuration").
//!
//! # Hierarchy
//!
//! 1. Built-in defaults
//! 2. Global config file: `~/.config/tmc-controller/config.toml` (via
//!    [`directories::ProjectDirs`])
//! 3. `--config <path>` override
//! 4. CLI flags (`--worker-count`, ...)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// The queue section of `TmcConfig` (spec.md §6 "Queue").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub processing_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub worker_count: usize,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "tmc-reconcile".into(),
            max_attempts: 15,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            processing_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            worker_count: 4,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { max_failures: 5, timeout_secs: 30, success_threshold: 2 }
    }
}

/// The placement section (spec.md §6 "Placement").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub affinity_weight: f64,
    pub capacity_weight: f64,
    pub spread_weight: f64,
    pub latency_weight: f64,
    pub rng_seed: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self { affinity_weight: 1.0, capacity_weight: 1.0, spread_weight: 1.0, latency_weight: 1.0, rng_seed: 0 }
    }
}

/// The quota section (spec.md §6 "Quota").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub aggregation_interval_secs: u64,
    pub violation_scan_interval_secs: u64,
    pub max_burst_multiplier: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { aggregation_interval_secs: 30, violation_scan_interval_secs: 60, max_burst_multiplier: 1.5 }
    }
}

/// Conflict resolution policy, mirrored from `tmc_core::sync::ConflictResolution`
/// so the config layer stays decoupled from the core's internal enum derives.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum ConflictResolutionPolicy {
    #[default]
    SourceWins,
    TargetWins,
    Manual,
}


impl From<ConflictResolutionPolicy> for tmc_core::sync::ConflictResolution {
    fn from(value: ConflictResolutionPolicy) -> Self {
        match value {
            ConflictResolutionPolicy::SourceWins => Self::SourceWins,
            ConflictResolutionPolicy::TargetWins => Self::TargetWins,
            ConflictResolutionPolicy::Manual => Self::Manual,
        }
    }
}

/// The syncer section (spec.md §6 "Syncer").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    pub conflict_resolution: ConflictResolutionPolicy,
    pub sync_frequency_secs: u64,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self { conflict_resolution: ConflictResolutionPolicy::default(), sync_frequency_secs: 15 }
    }
}

/// The health section (spec.md §6 "Health").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub heartbeat_interval_secs: u64,
    pub checks_interval_secs: u64,
    pub failure_threshold: u32,
    pub lease_namespace: String,
    pub lease_db_path: PathBuf,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            checks_interval_secs: 15,
            failure_threshold: 3,
            lease_namespace: "tmc".into(),
            lease_db_path: PathBuf::from("tmc-leases.sqlite"),
        }
    }
}

/// The full recognized configuration surface (spec.md §6 "Configuration").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmcConfig {
    pub queue: QueueConfig,
    pub placement: PlacementConfig,
    pub quota: QuotaConfig,
    pub syncer: SyncerConfig,
    pub health: HealthConfig,
}

impl QueueConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> tmc_core::queue::RetryPolicy {
        tmc_core::queue::RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            max_attempts: self.max_attempts,
            jitter: true,
        }
    }

    #[must_use]
    pub const fn circuit_breaker(&self) -> tmc_core::queue::CircuitBreakerConfig {
        tmc_core::queue::CircuitBreakerConfig {
            max_failures: self.circuit_breaker.max_failures,
            open_timeout: Duration::from_secs(self.circuit_breaker.timeout_secs),
            success_threshold: self.circuit_breaker.success_threshold,
        }
    }
}

impl PlacementConfig {
    #[must_use]
    pub const fn scoring_weights(&self) -> tmc_core::placement::ScoringWeights {
        tmc_core::placement::ScoringWeights {
            affinity: self.affinity_weight,
            capacity: self.capacity_weight,
            spread: self.spread_weight,
            latency: self.latency_weight,
        }
    }
}

/// Resolves the global config file path: `~/.config/tmc-controller/config.toml`
/// (or the platform equivalent), following the teacher's `ProjectDirs::from("",
/// "", ...)` convention.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tmc-controller").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Loads `TmcConfig` from `path` if it exists, falling back to defaults
/// otherwise. An explicit `--config` path that does not exist is an error;
/// the discovered global path is optional.
pub fn load(path: Option<&Path>, explicit: bool) -> anyhow::Result<TmcConfig> {
    let resolved = path.map(Path::to_path_buf).or_else(global_config_path);
    let Some(resolved) = resolved else {
        return Ok(TmcConfig::default());
    };
    match std::fs::read_to_string(&resolved) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(TmcConfig::default()),
        Err(err) => Err(anyhow::anyhow!("reading config {}: {err}", resolved.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_config_falls_back_to_defaults() {
        let config = load(Some(Path::new("/nonexistent/tmc-config.toml")), false).unwrap();
        assert_eq!(config.queue.worker_count, 4);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/tmc-config.toml")), true).is_err());
    }

    #[test]
    fn parses_overridden_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nworker_count = 8\n").unwrap();
        let config = load(Some(&path), true).unwrap();
        assert_eq!(config.queue.worker_count, 8);
        assert_eq!(config.queue.max_attempts, 15);
    }
}
