//! eventvault-core — foundation of the chain-event indexer.
//!
//! # Architecture
//!
//! ```text
//! triggers (startup / log sub / block sub / resweep)
//!        │ request(mode)
//!        ▼
//! CycleRequests (single-slot, latest-wins)
//!        │ next()
//!        ▼
//! Worker ──▶ Reconciler ──▶ ChainLogSource  (head + chunked log fetch)
//!                      ├──▶ dedupe + sort   (canonical identity & order)
//!                      ├──▶ EventStore      (atomic {collection, cursor} commit)
//!                      └──▶ SnapshotExporter (best-effort events.json)
//! ```
//!
//! The ports (`ChainLogSource`, `EventStore`, `SnapshotExporter`) are
//! implemented by the `eventvault-rpc` and `eventvault-store` crates.

pub mod config;
pub mod error;
pub mod normalize;
pub mod reconciler;
pub mod source;
pub mod store;
pub mod types;
pub mod worker;

pub use config::IndexerConfig;
pub use error::IndexError;
pub use reconciler::{CycleMode, CycleOutcome, CycleRunner, Reconciler};
pub use source::{fetch_range, ChainLogSource, LogQuery};
pub use store::{EventStore, SnapshotExporter};
pub use types::{EventArgs, EventCollection, EventKind, EventRecord};
pub use worker::{CycleRequests, Worker};
