//! The `ChainLogSource` port — the only source of truth for block height and
//! historical/real-time logs — plus the chunked range fetch built on top.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::IndexError;
use crate::types::{EventKind, EventRecord};

/// Identifies one event stream: a contract address plus the event kind
/// emitted by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Contract address (`0x…`).
    pub address: String,
    /// Event kind; its ABI signature selects `topics[0]`.
    pub kind: EventKind,
}

impl LogQuery {
    pub fn new(address: impl Into<String>, kind: EventKind) -> Self {
        Self { address: address.into(), kind }
    }
}

/// Remote ledger RPC capability with transport fallback.
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    /// Current chain head as seen by the underlying transport.
    async fn latest_block(&self) -> Result<u64, IndexError>;

    /// Decoded logs in the inclusive `[from_block, to_block]` range.
    ///
    /// Callers keep ranges within provider limits via [`fetch_range`].
    async fn get_logs(
        &self,
        query: &LogQuery,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventRecord>, IndexError>;

    /// Live log delivery, one message per observed log batch.
    ///
    /// At-least-once and unordered: reconnects may redeliver logs already
    /// seen. Treat each message as a trigger, never as authoritative data.
    async fn subscribe_logs(
        &self,
        query: &LogQuery,
    ) -> Result<mpsc::UnboundedReceiver<usize>, IndexError>;

    /// New block header numbers, best-effort at-least-once.
    async fn subscribe_blocks(&self) -> Result<mpsc::UnboundedReceiver<u64>, IndexError>;
}

#[async_trait]
impl<T: ChainLogSource + ?Sized> ChainLogSource for Arc<T> {
    async fn latest_block(&self) -> Result<u64, IndexError> {
        (**self).latest_block().await
    }

    async fn get_logs(
        &self,
        query: &LogQuery,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventRecord>, IndexError> {
        (**self).get_logs(query, from_block, to_block).await
    }

    async fn subscribe_logs(
        &self,
        query: &LogQuery,
    ) -> Result<mpsc::UnboundedReceiver<usize>, IndexError> {
        (**self).subscribe_logs(query).await
    }

    async fn subscribe_blocks(&self) -> Result<mpsc::UnboundedReceiver<u64>, IndexError> {
        (**self).subscribe_blocks().await
    }
}

/// Fetch `[from_block, latest_block]` in chunks of `chunk_size` blocks,
/// accumulating results in arrival order.
///
/// Each request covers `[cursor, min(cursor + chunk_size, latest_block)]`;
/// the cursor advances to one past the fetched range. A chunk failure aborts
/// the whole fetch — the caller sees a transient error and no state advance.
pub async fn fetch_range<S: ChainLogSource + ?Sized>(
    source: &S,
    query: &LogQuery,
    from_block: u64,
    latest_block: u64,
    chunk_size: u64,
) -> Result<Vec<EventRecord>, IndexError> {
    let mut all = Vec::new();
    let mut cursor = from_block;
    while cursor <= latest_block {
        let to_block = (cursor + chunk_size).min(latest_block);
        tracing::debug!(kind = %query.kind, from = cursor, to = to_block, "fetching log chunk");
        let chunk = source.get_logs(query, cursor, to_block).await?;
        all.extend(chunk);
        cursor = to_block + 1;
    }
    Ok(all)
}
