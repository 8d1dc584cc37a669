//! Persistence and export ports consumed by the reconciler.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::IndexError;
use crate::types::EventCollection;

/// Durable storage for the merged event history and the progress cursor.
///
/// `commit` writes both as one atomic unit: a reader must never observe a
/// state where the cursor advanced but the matching events did not persist,
/// or vice versa.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The persisted collection, or `None` before the first commit.
    async fn load_collection(&self) -> Result<Option<EventCollection>, IndexError>;

    /// Highest block number whose events are guaranteed captured, or `None`
    /// if no cycle ever committed. Absence is the explicit "never run"
    /// sentinel — the numeric value zero is never used for it.
    async fn load_cursor(&self) -> Result<Option<u64>, IndexError>;

    /// Atomically persist `{collection, cursor}`.
    async fn commit(&self, collection: &EventCollection, cursor: u64) -> Result<(), IndexError>;

    /// Release the underlying connection gracefully.
    async fn close(&self) -> Result<(), IndexError>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn load_collection(&self) -> Result<Option<EventCollection>, IndexError> {
        (**self).load_collection().await
    }

    async fn load_cursor(&self) -> Result<Option<u64>, IndexError> {
        (**self).load_cursor().await
    }

    async fn commit(&self, collection: &EventCollection, cursor: u64) -> Result<(), IndexError> {
        (**self).commit(collection, cursor).await
    }

    async fn close(&self) -> Result<(), IndexError> {
        (**self).close().await
    }
}

/// Best-effort export of the committed dataset for downstream consumers.
#[async_trait]
pub trait SnapshotExporter: Send + Sync {
    async fn export(&self, collection: &EventCollection) -> Result<(), IndexError>;
}

#[async_trait]
impl<T: SnapshotExporter + ?Sized> SnapshotExporter for Arc<T> {
    async fn export(&self, collection: &EventCollection) -> Result<(), IndexError> {
        (**self).export(collection).await
    }
}
