//! Latest-state resolution over eventually-consistent query results.
//!
//! Query endpoints return duplicates, stale versions and unconfirmed
//! transactions. The resolver collapses them into one record per identity:
//!
//! - records without the identity tag are dropped
//! - per identity the greatest `block_height` wins (unconfirmed = -1)
//! - equal heights keep whichever record came first in the input
//! - output is ordered by descending height, ties in encounter order
//!
//! There is no timestamp or id tie-break; encounter order is the contract.

use crate::record::TxRecord;
use std::collections::{HashMap, HashSet};

/// One winning record per identity value, newest first.
pub fn latest_per_identity(records: &[TxRecord], identity_tag: &str) -> Vec<TxRecord> {
    // identity -> slot in `winners`; slots follow first-seen identity order
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut winners: Vec<&TxRecord> = Vec::new();

    for record in records {
        let Some(identity) = identity_value(record, identity_tag) else {
            continue;
        };

        match slots.get(identity) {
            None => {
                slots.insert(identity, winners.len());
                winners.push(record);
            }
            Some(&slot) => {
                if record.sort_height() > winners[slot].sort_height() {
                    winners[slot] = record;
                }
            }
        }
    }

    // Stable: equal heights stay in encounter order.
    winners.sort_by(|a, b| b.sort_height().cmp(&a.sort_height()));
    winners.into_iter().cloned().collect()
}

/// The latest record for a single identity value.
pub fn latest_for(records: &[TxRecord], identity_tag: &str, value: &str) -> Option<TxRecord> {
    let mut best: Option<&TxRecord> = None;
    for record in records {
        if identity_value(record, identity_tag) != Some(value) {
            continue;
        }
        match best {
            Some(current) if record.sort_height() <= current.sort_height() => {}
            _ => best = Some(record),
        }
    }
    best.cloned()
}

/// Every record of one identity, newest first; duplicate tx ids collapse to
/// their first occurrence.
pub fn versions_for(records: &[TxRecord], identity_tag: &str, value: &str) -> Vec<TxRecord> {
    let mut seen = HashSet::new();
    let mut versions: Vec<&TxRecord> = records
        .iter()
        .filter(|r| identity_value(r, identity_tag) == Some(value))
        .filter(|r| seen.insert(r.id.as_str()))
        .collect();
    versions.sort_by(|a, b| b.sort_height().cmp(&a.sort_height()));
    versions.into_iter().cloned().collect()
}

fn identity_value<'a>(record: &'a TxRecord, identity_tag: &str) -> Option<&'a str> {
    record
        .tags
        .iter()
        .find(|t| t.name == identity_tag)
        .map(|t| t.value.as_str())
}
