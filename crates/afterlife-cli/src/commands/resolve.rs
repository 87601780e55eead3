//! Read-only lookups: head, selves, history, lineage, fetch.

use super::Backend;
use crate::output;
use afterlife_chain::{head_history, snapshot_lineage};
use afterlife_client::FetchHints;
use afterlife_core::schema::parse_head;
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::io::Write;

pub async fn head(backend: &Backend, self_id: &str, json: bool) -> Result<()> {
    let Some(record) = backend
        .query
        .latest_head(self_id)
        .await
        .with_context(|| format!("head lookup for {self_id} failed"))?
    else {
        bail!("no head found for Self {self_id}");
    };

    let (value, _) = backend
        .fetch
        .fetch_json(&record.id, &FetchHints::from_tags(&record.tags))
        .await
        .with_context(|| format!("cannot fetch head {}", record.id))?;
    let head = match parse_head(&value) {
        Ok(head) => Some(head),
        Err(e) => {
            tracing::warn!(tx = %record.id, error = %e, "head payload is invalid");
            None
        }
    };

    if json {
        return output::print_json(&json!({
            "record": record,
            "head": head,
        }));
    }
    output::print_head(&record, head.as_ref());
    Ok(())
}

pub async fn selves(backend: &Backend, json: bool) -> Result<()> {
    let heads = backend.query.list_heads().await.context("head listing failed")?;
    if json {
        return output::print_json(&heads);
    }
    output::print_selves(&heads);
    Ok(())
}

pub async fn history(backend: &Backend, self_id: &str, json: bool) -> Result<()> {
    let versions = head_history(&backend.query, &backend.fetch, self_id)
        .await
        .with_context(|| format!("history lookup for {self_id} failed"))?;
    if json {
        return output::print_json(&versions);
    }
    output::print_history(self_id, &versions);
    Ok(())
}

pub async fn lineage(backend: &Backend, snapshot_tx: &str, depth: usize, json: bool) -> Result<()> {
    let lineage = snapshot_lineage(&backend.fetch, snapshot_tx, depth).await;
    if json {
        return output::print_json(&lineage);
    }
    output::print_lineage(&lineage);
    Ok(())
}

/// Raw payload to stdout, integrity verdict to stderr.
pub async fn fetch(backend: &Backend, tx_id: &str, sha256: Option<&str>) -> Result<()> {
    // Tags carry the published hash; a failed lookup only costs the check.
    let mut hints = match backend.query.find_by_id(tx_id).await {
        Ok(Some(record)) => FetchHints::from_tags(&record.tags),
        Ok(None) => FetchHints::default(),
        Err(e) => {
            tracing::warn!(tx = tx_id, error = %e, "record lookup failed, fetching without tags");
            FetchHints::default()
        }
    };
    if let Some(hash) = sha256 {
        hints = hints.with_expected_sha256(hash);
    }

    let document = backend
        .fetch
        .fetch(tx_id, &hints)
        .await
        .with_context(|| format!("cannot fetch {tx_id}"))?;
    tracing::debug!(tx = tx_id, gateway = %document.gateway, bytes = document.bytes.len(), "fetched");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&document.bytes)?;
    stdout.flush()?;
    output::print_integrity(&document.integrity);

    if document.integrity.is_mismatch() {
        bail!("content hash mismatch for {tx_id}");
    }
    Ok(())
}
