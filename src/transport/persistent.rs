//! Persisted key-value store for state that must survive restarts, notably
//! the priority-systems fingerprint set (keyed by the literal
//! `priority_systems`).

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::SqlitePool;
use std::collections::HashMap;

pub const PRIORITY_SYSTEMS_KEY: &str = "priority_systems";

/// Adapter over whatever backs persisted values. A single writer surface;
/// callers never mutate state directly.
#[async_trait]
pub trait PersistentValues: Send + Sync {
    async fn get_fingerprints(&self, key: &str) -> anyhow::Result<Vec<u32>>;
    async fn set_fingerprints(&self, key: &str, values: &[u32]) -> anyhow::Result<()>;
}

/// `sqlx`-backed implementation storing one JSON-encoded row per key in a
/// `kv_store` table.
pub struct SqlxPersistentValues {
    pool: SqlitePool,
}

impl SqlxPersistentValues {
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePool::connect(&url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl PersistentValues for SqlxPersistentValues {
    async fn get_fingerprints(&self, key: &str) -> anyhow::Result<Vec<u32>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((json,)) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn set_fingerprints(&self, key: &str, values: &[u32]) -> anyhow::Result<()> {
        let json = serde_json::to_string(values)?;
        sqlx::query("INSERT INTO kv_store (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory stand-in for tests and the `no legacy store path configured`
/// startup fallback.
#[derive(Default)]
pub struct InMemoryPersistentValues {
    values: RwLock<HashMap<String, Vec<u32>>>,
}

#[async_trait]
impl PersistentValues for InMemoryPersistentValues {
    async fn get_fingerprints(&self, key: &str) -> anyhow::Result<Vec<u32>> {
        Ok(self.values.read().get(key).cloned().unwrap_or_default())
    }

    async fn set_fingerprints(&self, key: &str, values: &[u32]) -> anyhow::Result<()> {
        self.values.write().insert(key.to_string(), values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_fingerprints() {
        let store = InMemoryPersistentValues::default();
        store.set_fingerprints(PRIORITY_SYSTEMS_KEY, &[1, 2, 3]).await.unwrap();
        assert_eq!(store.get_fingerprints(PRIORITY_SYSTEMS_KEY).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn sqlx_store_persists_across_handles_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("priority.db");
        let path_str = path.to_string_lossy().into_owned();

        let store = SqlxPersistentValues::new(&path_str).await.unwrap();
        store.set_fingerprints(PRIORITY_SYSTEMS_KEY, &[42]).await.unwrap();

        let reopened = SqlxPersistentValues::new(&path_str).await.unwrap();
        assert_eq!(reopened.get_fingerprints(PRIORITY_SYSTEMS_KEY).await.unwrap(), vec![42]);
    }
}
