//! Typed event-history storage over the raw key-value capability.
//!
//! Three logical keys: the serialized collection, the progress cursor, and a
//! commit timestamp. Collection and cursor are written through one atomic
//! `multi_set`; the cursor key is simply absent before the first commit —
//! absence, not zero, is the "never run" sentinel.

use async_trait::async_trait;

use eventvault_core::{EventCollection, EventStore, IndexError};

use crate::kv::KvStore;

/// Key holding the serialized [`EventCollection`].
pub const EVENTS_KEY: &str = "event_storage:events";
/// Key holding the progress cursor as an ASCII decimal.
pub const CURSOR_KEY: &str = "event_storage:latest_block";
/// Key holding the RFC 3339 timestamp of the last commit.
pub const COMMITTED_AT_KEY: &str = "event_storage:committed_at";

/// [`EventStore`] implementation over any [`KvStore`].
pub struct KvEventStore<K> {
    kv: K,
}

impl<K: KvStore> KvEventStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Timestamp of the last successful commit, if any.
    pub async fn committed_at(&self) -> Result<Option<String>, IndexError> {
        let raw = self.kv.get(COMMITTED_AT_KEY).await?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[async_trait]
impl<K: KvStore> EventStore for KvEventStore<K> {
    async fn load_collection(&self) -> Result<Option<EventCollection>, IndexError> {
        let Some(raw) = self.kv.get(EVENTS_KEY).await? else {
            return Ok(None);
        };
        let collection = serde_json::from_slice(&raw)
            .map_err(|e| IndexError::Store(format!("corrupt event collection: {e}")))?;
        Ok(Some(collection))
    }

    async fn load_cursor(&self) -> Result<Option<u64>, IndexError> {
        let Some(raw) = self.kv.get(CURSOR_KEY).await? else {
            return Ok(None);
        };
        let text = String::from_utf8(raw)
            .map_err(|e| IndexError::Store(format!("corrupt cursor: {e}")))?;
        let cursor = text
            .parse()
            .map_err(|e| IndexError::Store(format!("corrupt cursor {text:?}: {e}")))?;
        Ok(Some(cursor))
    }

    async fn commit(&self, collection: &EventCollection, cursor: u64) -> Result<(), IndexError> {
        let serialized = serde_json::to_vec(collection)
            .map_err(|e| IndexError::Store(format!("serialize collection: {e}")))?;
        let committed_at = chrono::Utc::now().to_rfc3339();

        self.kv
            .multi_set(&[
                (EVENTS_KEY, serialized),
                (CURSOR_KEY, cursor.to_string().into_bytes()),
                (COMMITTED_AT_KEY, committed_at.into_bytes()),
            ])
            .await?;

        tracing::debug!(cursor, events = collection.total(), "state committed");
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.kv.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use alloy_primitives::U256;
    use eventvault_core::{EventArgs, EventKind, EventRecord};

    fn collection() -> EventCollection {
        let mut col = EventCollection::new();
        col.append(
            EventKind::Transfer,
            vec![EventRecord {
                block_number: 150,
                transaction_hash: "0xaa".into(),
                transaction_index: 0,
                log_index: 0,
                args: EventArgs::Transfer {
                    from: "0x1111111111111111111111111111111111111111".into(),
                    to: "0x2222222222222222222222222222222222222222".into(),
                    token_id: U256::from(9u64),
                },
            }],
        );
        col
    }

    #[tokio::test]
    async fn fresh_store_has_no_state() {
        let store = KvEventStore::new(MemoryKvStore::new());
        assert!(store.load_collection().await.unwrap().is_none());
        assert!(store.load_cursor().await.unwrap().is_none());
        assert!(store.committed_at().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_then_load_roundtrip() {
        let store = KvEventStore::new(MemoryKvStore::new());
        let col = collection();

        store.commit(&col, 25_000).await.unwrap();

        assert_eq!(store.load_collection().await.unwrap().unwrap(), col);
        assert_eq!(store.load_cursor().await.unwrap(), Some(25_000));
        assert!(store.committed_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cursor_zero_is_distinct_from_absent() {
        let store = KvEventStore::new(MemoryKvStore::new());
        store.commit(&EventCollection::new(), 0).await.unwrap();
        // A committed zero cursor loads as Some(0), not as "never run".
        assert_eq!(store.load_cursor().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn recommit_overwrites_previous_state() {
        let store = KvEventStore::new(MemoryKvStore::new());
        store.commit(&collection(), 1_000).await.unwrap();
        store.commit(&EventCollection::new(), 2_000).await.unwrap();

        assert_eq!(store.load_cursor().await.unwrap(), Some(2_000));
        assert!(store.load_collection().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_collection_is_a_store_error() {
        let kv = MemoryKvStore::new();
        kv.set(EVENTS_KEY, b"not json").await.unwrap();
        let store = KvEventStore::new(kv);
        assert!(matches!(store.load_collection().await, Err(IndexError::Store(_))));
    }

    #[tokio::test]
    async fn corrupt_cursor_is_a_store_error() {
        let kv = MemoryKvStore::new();
        kv.set(CURSOR_KEY, b"twelve").await.unwrap();
        let store = KvEventStore::new(kv);
        assert!(matches!(store.load_cursor().await, Err(IndexError::Store(_))));
    }
}
