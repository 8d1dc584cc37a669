//! The durable key-value capability the event store is built on.

use async_trait::async_trait;

use eventvault_core::IndexError;

/// Durable key-value storage with an atomic multi-key write.
///
/// Implementations: [`MemoryKvStore`](crate::memory::MemoryKvStore) and,
/// behind the `sqlite` feature, [`SqliteKvStore`](crate::sqlite::SqliteKvStore).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key; `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError>;

    /// Write a single key.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), IndexError>;

    /// Write several keys as one atomic unit: either every entry becomes
    /// visible or none does.
    async fn multi_set(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), IndexError>;

    /// Release the underlying connection gracefully.
    async fn close(&self) -> Result<(), IndexError>;
}
