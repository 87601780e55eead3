//! Human-readable printers. Everything here writes to stdout; diagnostics go
//! through `tracing` on stderr.

use afterlife_chain::{
    ChainReport, Convergence, DocumentReport, HeadVersion, Lineage, LineageStop, PublishOutcome,
};
use afterlife_client::Integrity;
use afterlife_core::namespace::{IDENTITY_TAG, TAG_ENTITY};
use afterlife_core::{SelfHead, TxRecord};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use colored::Colorize;
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `1700000000` -> `2023-11-14 22:13:20 UTC`.
pub fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn block_label(record: &TxRecord) -> String {
    match (record.block_height, record.block_timestamp) {
        (Some(height), Some(ts)) => format!("block {} ({})", height, format_timestamp(ts)),
        (Some(height), None) => format!("block {}", height),
        (None, _) => "pending".yellow().to_string(),
    }
}

fn integrity_label(integrity: &Integrity) -> String {
    match integrity {
        Integrity::NotApplicable => "no hash".dimmed().to_string(),
        Integrity::Verified { .. } => "sha256 ok".green().to_string(),
        Integrity::Mismatch { .. } => "sha256 MISMATCH".red().bold().to_string(),
    }
}

pub fn print_integrity(integrity: &Integrity) {
    match integrity {
        Integrity::NotApplicable => {
            eprintln!("{} no expected hash, content not verified", "!".yellow())
        }
        Integrity::Verified { sha256 } => eprintln!("{} sha256 {}", "ok".green().bold(), sha256),
        Integrity::Mismatch { expected, actual } => eprintln!(
            "{} sha256 mismatch: expected {}, got {}",
            "✗".red().bold(),
            expected,
            actual
        ),
    }
}

pub fn print_head(record: &TxRecord, head: Option<&SelfHead>) {
    let self_id = record.tag_index().first(IDENTITY_TAG).unwrap_or("?").to_string();
    println!("{} {}", "Self".bold(), self_id.cyan());
    println!("  head tx   {}", record.id);
    println!("  status    {}", block_label(record));
    if !record.owner_address.is_empty() {
        println!("  owner     {}", record.owner_address);
    }
    if let Some(head) = head {
        println!("  name      {}", head.name);
        if let Some(description) = &head.description {
            println!("  about     {}", description);
        }
        println!("  snapshot  {}", head.snapshot_tx);
        if let Some(updated) = &head.updated_at {
            println!("  updated   {}", updated);
        }
        if let Some(fork) = &head.fork_of {
            println!("  fork of   {} @ {}", fork.source_self_id, fork.source_head_tx);
        }
    }
}

pub fn print_selves(records: &[TxRecord]) {
    if records.is_empty() {
        println!("No Selves found.");
        return;
    }
    println!("{} ({})", "Selves".bold(), records.len());
    for record in records {
        let index = record.tag_index();
        println!(
            "  {} {}  {}",
            "→".cyan(),
            index.first(IDENTITY_TAG).unwrap_or("?"),
            format!("{}  {}", record.id, block_label(record)).dimmed()
        );
    }
}

pub fn print_history(self_id: &str, versions: &[HeadVersion]) {
    if versions.is_empty() {
        println!("No head versions for {}.", self_id);
        return;
    }
    println!("{} {} ({} versions)", "History".bold(), self_id.cyan(), versions.len());
    for (i, version) in versions.iter().enumerate() {
        let marker = if i == 0 { "*".green().bold() } else { "-".normal() };
        println!("  {} {}  {}", marker, version.record.id, block_label(&version.record));
        match (&version.head, &version.problem) {
            (Some(head), _) => println!("      snapshot {}", head.snapshot_tx),
            (None, Some(problem)) => println!("      {}", problem.red()),
            (None, None) => {}
        }
    }
}

pub fn print_lineage(lineage: &Lineage) {
    println!("{} ({} snapshots)", "Lineage".bold(), lineage.entries.len());
    for entry in &lineage.entries {
        println!(
            "  {} {}  {} ideas, {} edges",
            "→".cyan(),
            entry.tx_id,
            entry.snapshot.ideas.len(),
            entry.snapshot.edges.len()
        );
    }
    let stop = match &lineage.stop {
        LineageStop::Root => "reached root snapshot".green().to_string(),
        LineageStop::Unreachable { tx_id, error } => {
            format!("{} {}: {}", "unreachable".red(), tx_id, error)
        }
        LineageStop::Unparseable { tx_id, error } => {
            format!("{} {}: {}", "unparseable".red(), tx_id, error)
        }
        LineageStop::Cycle { tx_id } => format!("{} at {}", "cycle".red(), tx_id),
        LineageStop::DepthLimit { depth } => {
            format!("{} {}", "stopped at depth".yellow(), depth)
        }
    };
    println!("  {}", stop);
}

pub fn print_chain_report(report: &ChainReport) {
    let verdict = if report.ok {
        "ok".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!("{} {} {}", "Chain".bold(), report.self_id.cyan(), verdict);

    if let Some(head) = &report.head {
        println!("  head      {}", head.tx_id);
    }
    if let Some(snapshot) = &report.snapshot {
        let integrity = snapshot
            .integrity
            .as_ref()
            .map(integrity_label)
            .unwrap_or_default();
        println!("  snapshot  {}  {}", snapshot.tx_id, integrity);
    }
    for idea in &report.ideas {
        let mark = if idea.ok { "✓".green() } else { "✗".red() };
        let integrity = idea.integrity.as_ref().map(integrity_label).unwrap_or_default();
        println!("    {} {} ({})  {}", mark, idea.idea_id, idea.tx_id, integrity);
    }

    if !report.errors.is_empty() {
        println!("{} ({})", "Errors".red().bold(), report.errors.len());
        for finding in &report.errors {
            println!("  - {}", finding);
        }
    }
    if !report.warnings.is_empty() {
        println!("{} ({})", "Warnings".yellow().bold(), report.warnings.len());
        for finding in &report.warnings {
            println!("  - {}", finding);
        }
    }
}

pub fn print_document_report(report: &DocumentReport) {
    let verdict = if report.ok {
        "ok".green().bold()
    } else {
        "FAILED".red().bold()
    };
    let entity = report
        .entity
        .map(|e| e.as_str().to_string())
        .or_else(|| {
            report
                .record
                .as_ref()
                .and_then(|r| r.tag_index().first(TAG_ENTITY).map(str::to_string))
        })
        .unwrap_or_else(|| "unknown".to_string());
    println!("{} {} [{}] {}", "Transaction".bold(), report.tx_id, entity, verdict);
    if let Some(record) = &report.record {
        println!("  status    {}", block_label(record));
    }
    if let Some(integrity) = &report.integrity {
        println!("  content   {}", integrity_label(integrity));
    }
    for error in &report.errors {
        println!("  {} {}", "error".red(), error);
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning".yellow(), warning);
    }
}

pub fn print_publish_outcome(outcome: &PublishOutcome) {
    println!("{} published {}", "ok".green().bold(), outcome.self_id.cyan());
    for idea in &outcome.ideas {
        let how = if idea.uploaded { "uploaded" } else { "reused" };
        println!("  idea      {} -> {} ({})", idea.idea_id, idea.tx_id, how);
    }
    println!("  snapshot  {}", outcome.snapshot_tx);
    if let Some(parent) = &outcome.parent_snapshot_tx {
        println!("  parent    {}", parent);
    }
    println!("  head      {}", outcome.head_tx);
    match &outcome.convergence {
        Convergence::Skipped => {}
        Convergence::Converged { attempts } => println!(
            "  {} latest head after {} poll(s)",
            "→".cyan(),
            attempts
        ),
        Convergence::NotConverged { attempts, observed } => println!(
            "  {} new head not yet visible after {} poll(s) (latest: {})",
            "!".yellow(),
            attempts,
            observed.as_deref().unwrap_or("none")
        ),
    }
}
