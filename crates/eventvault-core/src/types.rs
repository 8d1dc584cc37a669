//! Shared types for the event history pipeline.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

// ─── EventKind ───────────────────────────────────────────────────────────────

/// The three contract events the indexer tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `Transfer(address,address,uint256)` on the collection contract.
    Transfer,
    /// `Purchase(address,uint256)` on the vendor contract.
    Purchase,
    /// `Claim(address,uint16[])` on the vendor contract.
    Claim,
}

impl EventKind {
    /// All tracked kinds, in the order they are fetched each cycle.
    pub const ALL: [EventKind; 3] = [Self::Transfer, Self::Purchase, Self::Claim];

    /// The canonical ABI signature, hashed into `topics[0]` on the wire.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Transfer => "Transfer(address,address,uint256)",
            Self::Purchase => "Purchase(address,uint256)",
            Self::Claim => "Claim(address,uint16[])",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transfer => write!(f, "transfer"),
            Self::Purchase => write!(f, "purchase"),
            Self::Claim => write!(f, "claim"),
        }
    }
}

// ─── EventRecord ─────────────────────────────────────────────────────────────

/// Decoded arguments, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventArgs {
    #[serde(rename_all = "camelCase")]
    Transfer { from: String, to: String, token_id: U256 },
    #[serde(rename_all = "camelCase")]
    Purchase { receiver: String, amount: U256 },
    #[serde(rename_all = "camelCase")]
    Claim { receiver: String, tokens: Vec<u16> },
}

impl EventArgs {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transfer { .. } => EventKind::Transfer,
            Self::Purchase { .. } => EventKind::Purchase,
            Self::Claim { .. } => EventKind::Claim,
        }
    }
}

/// A single log event observed on chain.
///
/// Two records with the same `(transaction_hash, log_index)` pair are the same
/// logical event no matter how many times they were observed — subscriptions
/// redeliver and incremental fetch ranges overlap, so observation count
/// carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Transaction hash (`0x…`, 32 bytes).
    pub transaction_hash: String,
    /// Position of the transaction within its block.
    pub transaction_index: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Kind-specific decoded payload.
    pub args: EventArgs,
}

impl EventRecord {
    /// The event kind, derived from the payload.
    pub fn kind(&self) -> EventKind {
        self.args.kind()
    }

    /// Canonical identity key.
    pub fn identity(&self) -> (&str, u64) {
        (&self.transaction_hash, self.log_index)
    }
}

// ─── EventCollection ─────────────────────────────────────────────────────────

/// The full merged event history: one ordered sequence per kind.
///
/// Each sequence is kept sorted ascending by `(block_number,
/// transaction_index)` with stable ties — see [`normalize`](Self::normalize).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCollection {
    pub transfers: Vec<EventRecord>,
    pub purchases: Vec<EventRecord>,
    pub claims: Vec<EventRecord>,
}

impl EventCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence holding events of `kind`.
    pub fn events(&self, kind: EventKind) -> &[EventRecord] {
        match kind {
            EventKind::Transfer => &self.transfers,
            EventKind::Purchase => &self.purchases,
            EventKind::Claim => &self.claims,
        }
    }

    /// Mutable access to the sequence holding events of `kind`.
    pub fn events_mut(&mut self, kind: EventKind) -> &mut Vec<EventRecord> {
        match kind {
            EventKind::Transfer => &mut self.transfers,
            EventKind::Purchase => &mut self.purchases,
            EventKind::Claim => &mut self.claims,
        }
    }

    /// Append freshly fetched events to the sequence for `kind`.
    pub fn append(&mut self, kind: EventKind, events: Vec<EventRecord>) {
        self.events_mut(kind).extend(events);
    }

    /// Dedupe then sort every per-kind sequence, in that order.
    ///
    /// Dedup is load-bearing: incremental merges append ranges that overlap
    /// previously persisted ones, and this is the only place duplicates die.
    pub fn normalize(&mut self) {
        for kind in EventKind::ALL {
            let events = self.events_mut(kind);
            let deduped = crate::normalize::dedupe(std::mem::take(events));
            *events = deduped;
            crate::normalize::sort_events(events);
        }
    }

    /// Total number of events across all kinds.
    pub fn total(&self) -> usize {
        self.transfers.len() + self.purchases.len() + self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
