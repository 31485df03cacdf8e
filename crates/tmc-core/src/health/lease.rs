//! Heartbeat lease persistence (spec.md §4.G).
//!
//! The lease is the one durable artifact this crate writes directly (spec.md §6
//! "Persisted state"); everything else is in-memory working state.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error("lease store error: {0}")]
    Store(String),
}

impl LeaseError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::Transient
    }
}

/// A named lease, `{target}-heartbeat`, in a chosen namespace (spec.md §4.G).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub namespace: String,
    pub holder_identity: String,
    pub lease_duration: std::time::Duration,
    pub renew_time: DateTime<Utc>,
}

impl Lease {
    #[must_use]
    pub fn heartbeat_name(target: &str) -> String {
        format!("{target}-heartbeat")
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.renew_time)
            > chrono::Duration::from_std(self.lease_duration).unwrap_or(chrono::Duration::zero())
    }
}

/// SQLite-backed lease store (spec.md §6 "Leases are the only durable artifact
/// the core writes directly").
pub struct LeaseStore {
    pool: SqlitePool,
}

impl LeaseStore {
    /// Opens (and migrates) a lease store backed by `pool`.
    pub async fn new(pool: SqlitePool) -> Result<Self, LeaseError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS leases (
                name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                holder_identity TEXT NOT NULL,
                lease_duration_ms INTEGER NOT NULL,
                renew_time TEXT NOT NULL,
                PRIMARY KEY (namespace, name)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| LeaseError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Touches `renewTime = now()` for the named lease, creating it if absent.
    pub async fn renew(&self, lease: &Lease) -> Result<(), LeaseError> {
        sqlx::query(
            "INSERT INTO leases (name, namespace, holder_identity, lease_duration_ms, renew_time)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, name) DO UPDATE SET
                holder_identity = excluded.holder_identity,
                lease_duration_ms = excluded.lease_duration_ms,
                renew_time = excluded.renew_time",
        )
        .bind(&lease.name)
        .bind(&lease.namespace)
        .bind(&lease.holder_identity)
        .bind(i64::try_from(lease.lease_duration.as_millis()).unwrap_or(i64::MAX))
        .bind(lease.renew_time.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LeaseError::Store(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<Lease>, LeaseError> {
        let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT name, namespace, holder_identity, lease_duration_ms, renew_time
             FROM leases WHERE namespace = ?1 AND name = ?2",
        )
        .bind(namespace)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LeaseError::Store(e.to_string()))?;

        row.map(|(name, namespace, holder_identity, duration_ms, renew_time)| {
            Ok(Lease {
                name,
                namespace,
                holder_identity,
                lease_duration: std::time::Duration::from_millis(duration_ms.max(0) as u64),
                renew_time: DateTime::parse_from_rfc3339(&renew_time)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| LeaseError::Store(e.to_string()))?,
            })
        })
        .transpose()
    }

    pub async fn release(&self, namespace: &str, name: &str) -> Result<(), LeaseError> {
        sqlx::query("DELETE FROM leases WHERE namespace = ?1 AND name = ?2")
            .bind(namespace)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| LeaseError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn renew_then_get_round_trips() {
        let store = LeaseStore::new(pool().await).await.unwrap();
        let lease = Lease {
            name: Lease::heartbeat_name("east-1"),
            namespace: "tmc-system".into(),
            holder_identity: "controller-a".into(),
            lease_duration: std::time::Duration::from_secs(30),
            renew_time: Utc::now(),
        };
        store.renew(&lease).await.unwrap();
        let fetched = store.get(&lease.namespace, &lease.name).await.unwrap().unwrap();
        assert_eq!(fetched.holder_identity, "controller-a");
    }

    #[tokio::test]
    async fn lease_expires_after_duration_elapses() {
        let lease = Lease {
            name: "east-1-heartbeat".into(),
            namespace: "tmc-system".into(),
            holder_identity: "controller-a".into(),
            lease_duration: std::time::Duration::from_secs(10),
            renew_time: Utc::now() - chrono::Duration::seconds(11),
        };
        assert!(lease.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn release_removes_lease() {
        let store = LeaseStore::new(pool().await).await.unwrap();
        let lease = Lease {
            name: Lease::heartbeat_name("east-1"),
            namespace: "tmc-system".into(),
            holder_identity: "controller-a".into(),
            lease_duration: std::time::Duration::from_secs(30),
            renew_time: Utc::now(),
        };
        store.renew(&lease).await.unwrap();
        store.release(&lease.namespace, &lease.name).await.unwrap();
        assert!(store.get(&lease.namespace, &lease.name).await.unwrap().is_none());
    }
}
