//! Read-only walks over past versions.
//!
//! `head_history` lists every head a Self has published, newest first.
//! `snapshot_lineage` follows `parent_snapshot_tx` links backwards with the
//! lenient snapshot parser and records why the walk stopped.

use afterlife_client::{DocumentFetchClient, FetchHints, LedgerQueryClient, QueryError};
use afterlife_core::schema::{parse_head, parse_snapshot};
use afterlife_core::{SelfHead, SelfSnapshot, TxRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_LINEAGE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadVersion {
    pub record: TxRecord,
    pub head: Option<SelfHead>,
    /// Why `head` is missing, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// All head versions of `self_id`, newest first, each with its parsed payload
/// where it could be fetched.
pub async fn head_history(
    query: &LedgerQueryClient,
    fetch: &DocumentFetchClient,
    self_id: &str,
) -> Result<Vec<HeadVersion>, QueryError> {
    let records = query.head_versions(self_id).await?;
    let mut versions = Vec::with_capacity(records.len());

    for record in records {
        let hints = FetchHints::from_tags(&record.tags);
        let (head, problem) = match fetch.fetch_json(&record.id, &hints).await {
            Ok((value, _)) => match parse_head(&value) {
                Ok(head) => (Some(head), None),
                Err(e) => (None, Some(format!("invalid head: {e}"))),
            },
            Err(e) => (None, Some(e.to_string())),
        };
        versions.push(HeadVersion {
            record,
            head,
            problem,
        });
    }

    tracing::debug!(self_id, versions = versions.len(), "head history");
    Ok(versions)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub tx_id: String,
    pub snapshot: SelfSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LineageStop {
    /// The last snapshot has no parent.
    Root,
    Unreachable { tx_id: String, error: String },
    Unparseable { tx_id: String, error: String },
    Cycle { tx_id: String },
    DepthLimit { depth: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// Starting snapshot first.
    pub entries: Vec<LineageEntry>,
    pub stop: LineageStop,
}

/// Follow parent links from `snapshot_tx`, visiting at most `max_depth`
/// snapshots.
pub async fn snapshot_lineage(fetch: &DocumentFetchClient, snapshot_tx: &str, max_depth: usize) -> Lineage {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(snapshot_tx.to_string());

    while let Some(tx_id) = next.take() {
        if !seen.insert(tx_id.clone()) {
            return Lineage {
                entries,
                stop: LineageStop::Cycle { tx_id },
            };
        }
        if entries.len() >= max_depth {
            return Lineage {
                entries,
                stop: LineageStop::DepthLimit { depth: max_depth },
            };
        }

        let value = match fetch.fetch_json(&tx_id, &FetchHints::default()).await {
            Ok((value, _)) => value,
            Err(e) => {
                return Lineage {
                    entries,
                    stop: LineageStop::Unreachable {
                        tx_id,
                        error: e.to_string(),
                    },
                }
            }
        };
        let snapshot = match parse_snapshot(&value) {
            Ok(snapshot) => snapshot,
            Err(errors) => {
                let error = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Lineage {
                    entries,
                    stop: LineageStop::Unparseable { tx_id, error },
                };
            }
        };

        next = snapshot
            .parent_snapshot_tx
            .clone()
            .filter(|p| !p.trim().is_empty());
        entries.push(LineageEntry { tx_id, snapshot });
    }

    Lineage {
        entries,
        stop: LineageStop::Root,
    }
}
