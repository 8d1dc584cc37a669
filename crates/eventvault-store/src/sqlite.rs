//! SQLite key-value backend.
//!
//! A single `kv` table in WAL mode; `multi_set` runs inside one transaction,
//! which is what makes the `{events, cursor}` commit atomic.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use eventvault_core::IndexError;

use crate::kv::KvStore;

/// SQLite-backed [`KvStore`].
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (or create) the database at `path`.
    ///
    /// `path` may be a plain file path (`"./eventvault.db"`) or a full
    /// SQLite URL (`"sqlite:./eventvault.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. Data is lost when the pool drops.
    pub async fn in_memory() -> Result<Self, IndexError> {
        // A single long-lived connection: each new in-memory connection
        // would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT NOT NULL PRIMARY KEY,
                value BLOB NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::Store(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;
        Ok(())
    }

    async fn multi_set(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;

        for (key, value) in entries {
            sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
                .bind(*key)
                .bind(value.as_slice())
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Store(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| IndexError::Store(e.to_string()))?;
        debug!(keys = entries.len(), "atomic batch committed");
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_roundtrip() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("cursor", b"1000").await.unwrap();
        assert_eq!(store.get("cursor").await.unwrap().unwrap(), b"1000");

        // Upsert overwrites.
        store.set("cursor", b"2000").await.unwrap();
        assert_eq!(store.get("cursor").await.unwrap().unwrap(), b"2000");
    }

    #[tokio::test]
    async fn multi_set_visible_after_commit() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store
            .multi_set(&[
                ("events", br#"{"transfers":[]}"#.to_vec()),
                ("cursor", b"25000".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(store.get("cursor").await.unwrap().unwrap(), b"25000");
        assert!(store.get("events").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn binary_values_survive() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        let blob: Vec<u8> = (0..=255).collect();
        store.set("blob", &blob).await.unwrap();
        assert_eq!(store.get("blob").await.unwrap().unwrap(), blob);
    }

    #[tokio::test]
    async fn close_is_clean() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store.set("k", b"v").await.unwrap();
        store.close().await.unwrap();
    }
}
