//! Durable key-value persistence for per-variant feed cursors.
//!
//! The engine only needs `get`/`set`/`remove` on dotted string keys
//! (`feed.last_seen.latest` and friends), so the contract is a small trait
//! with two implementations: SQLite for the real client, in-memory for
//! tests and ephemeral sessions.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;

/// Persistence errors with user-friendly messages.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance of the client has locked the database
    #[error("Another client instance appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Generic database error
    #[error("Storage error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking.
    /// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14).
    fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}

/// Durable string key-value storage.
///
/// Corrupt or missing values are the caller's concern: storage reports what
/// is there, the notification tracker decides that garbage means
/// "never seen".
pub trait Persistence: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
    fn set(&self, key: &str, value: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// Forwarding impls so stores can be shared by reference or Arc without
// wrapper types.
impl<P: Persistence> Persistence for &P {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

impl<P: Persistence> Persistence for std::sync::Arc<P> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

// ============================================================================
// SQLite-backed store
// ============================================================================

/// SQLite-backed persistence with a single `kv` table and UPSERT writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) and migrate the store.
    /// Pass `":memory:"` for an ephemeral database.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(Self { pool })
    }
}

impl Persistence for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory persistence for tests and sessions that opt out of durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sqlite_get_missing_key() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        assert_eq!(store.get("feed.last_seen.latest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_set_get_remove_roundtrip() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.set("feed.last_seen.latest", "42").await.unwrap();
        assert_eq!(
            store.get("feed.last_seen.latest").await.unwrap(),
            Some("42".to_string())
        );

        store.remove("feed.last_seen.latest").await.unwrap();
        assert_eq!(store.get("feed.last_seen.latest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_set_upserts() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.set("k", "1").await.unwrap();
        store.set("k", "2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
