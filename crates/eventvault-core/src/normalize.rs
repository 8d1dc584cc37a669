//! Canonical identity and order over event records.
//!
//! Both functions are pure and total. They are applied — dedupe first, then
//! sort — to each per-kind sequence independently after every merge.

use std::collections::HashSet;

use crate::types::EventRecord;

/// Keep the first occurrence per `(transaction_hash, log_index)` identity
/// key, preserving input order for the kept element.
pub fn dedupe(events: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut seen: HashSet<(String, u64)> = HashSet::with_capacity(events.len());
    events
        .into_iter()
        .filter(|ev| seen.insert((ev.transaction_hash.clone(), ev.log_index)))
        .collect()
}

/// Sort ascending by `(block_number, transaction_index)`.
///
/// `sort_by_key` is a stable sort, so elements equal on both fields retain
/// their relative input order.
pub fn sort_events(events: &mut [EventRecord]) {
    events.sort_by_key(|ev| (ev.block_number, ev.transaction_index));
}
