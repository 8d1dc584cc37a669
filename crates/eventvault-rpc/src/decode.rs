//! Raw `eth_getLogs` payloads → decoded event records.
//!
//! The three tracked events are fixed-shape, so decoding is done directly on
//! 32-byte words rather than through a generic ABI machine:
//!
//! - `Transfer(address indexed, address indexed, uint256 indexed)` — all
//!   arguments live in topics.
//! - `Purchase(address indexed, uint256)` — receiver in topics, amount as the
//!   single data word.
//! - `Claim(address indexed, uint16[])` — receiver in topics, token list as a
//!   dynamic array in data (offset word, length word, one word per element).

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

use eventvault_core::{EventArgs, EventKind, EventRecord};

use crate::error::TransportError;

// ─── Signatures ──────────────────────────────────────────────────────────────

/// keccak256 of a canonical event signature string — the `topics[0]` value
/// the node filters on.
pub fn signature_topic(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

// ─── RawLog ──────────────────────────────────────────────────────────────────

/// A raw log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub log_index: String,
    /// `true` when the log was dropped by a chain reorganization.
    #[serde(default)]
    pub removed: bool,
}

// ─── Quantities and words ────────────────────────────────────────────────────

/// Parse a hex quantity (`"0x1a2b"`) into a u64.
pub fn parse_quantity(raw: &str) -> Result<u64, TransportError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|_| TransportError::InvalidResponse(format!("bad hex quantity: {raw:?}")))
}

/// Format a block number the way the JSON-RPC API expects it.
pub fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn topic_word(topic: &str) -> Result<[u8; 32], TransportError> {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes = hex::decode(digits)
        .map_err(|e| TransportError::Decode(format!("bad topic hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| TransportError::Decode(format!("topic is not 32 bytes: {topic:?}")))
}

/// An indexed `address` argument: the low 20 bytes of its topic word.
fn topic_address(topic: &str) -> Result<String, TransportError> {
    let word = topic_word(topic)?;
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

/// An indexed `uint256` argument.
fn topic_u256(topic: &str) -> Result<U256, TransportError> {
    Ok(U256::from_be_bytes(topic_word(topic)?))
}

fn data_words(data: &str) -> Result<Vec<u8>, TransportError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits).map_err(|e| TransportError::Decode(format!("bad data hex: {e}")))
}

fn word_at(raw: &[u8], index: usize) -> Result<&[u8], TransportError> {
    raw.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| TransportError::Decode(format!("data truncated at word {index}")))
}

fn word_usize(word: &[u8]) -> Result<usize, TransportError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(TransportError::Decode("word out of usize range".into()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(tail) as usize)
}

/// Decode an ABI-encoded `uint16[]` from log data.
fn data_u16_array(data: &str) -> Result<Vec<u16>, TransportError> {
    let raw = data_words(data)?;
    let offset = word_usize(word_at(&raw, 0)?)?;
    if offset % 32 != 0 {
        return Err(TransportError::Decode(format!("misaligned array offset {offset}")));
    }
    let length_index = offset / 32;
    let length = word_usize(word_at(&raw, length_index)?)?;

    let mut tokens = Vec::with_capacity(length);
    for i in 0..length {
        let word = word_at(&raw, length_index + 1 + i)?;
        if word[..30].iter().any(|b| *b != 0) {
            return Err(TransportError::Decode("uint16 element out of range".into()));
        }
        tokens.push(u16::from_be_bytes([word[30], word[31]]));
    }
    Ok(tokens)
}

/// Decode a single `uint256` data word.
fn data_u256(data: &str) -> Result<U256, TransportError> {
    let raw = data_words(data)?;
    Ok(U256::from_be_slice(word_at(&raw, 0)?))
}

// ─── Log decoding ────────────────────────────────────────────────────────────

fn indexed_topic<'a>(raw: &'a RawLog, position: usize) -> Result<&'a str, TransportError> {
    raw.topics
        .get(position)
        .map(String::as_str)
        .ok_or_else(|| TransportError::Decode(format!("missing topic {position}")))
}

/// Decode a raw log into an [`EventRecord`] of the given kind.
pub fn decode_log(kind: EventKind, raw: &RawLog) -> Result<EventRecord, TransportError> {
    let args = match kind {
        EventKind::Transfer => EventArgs::Transfer {
            from: topic_address(indexed_topic(raw, 1)?)?,
            to: topic_address(indexed_topic(raw, 2)?)?,
            token_id: topic_u256(indexed_topic(raw, 3)?)?,
        },
        EventKind::Purchase => EventArgs::Purchase {
            receiver: topic_address(indexed_topic(raw, 1)?)?,
            amount: data_u256(&raw.data)?,
        },
        EventKind::Claim => EventArgs::Claim {
            receiver: topic_address(indexed_topic(raw, 1)?)?,
            tokens: data_u16_array(&raw.data)?,
        },
    };

    Ok(EventRecord {
        block_number: parse_quantity(&raw.block_number)?,
        transaction_hash: raw.transaction_hash.clone(),
        transaction_index: parse_quantity(&raw.transaction_index)?,
        log_index: parse_quantity(&raw.log_index)?,
        args,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
