//! Integration tests for the complete Afterlife pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Publish → ledger file on disk → reload → verify
//! - Preferences → ClientConfig → gateway fallback order
//! - Republish with auto parent → lineage and head history
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use afterlife_chain::{
    head_history, snapshot_lineage, ChainVerifier, IdeaDraft, LineageStop, PublishRequest,
    Publisher,
};
use afterlife_client::{
    AttemptError, ClientConfig, DocumentFetchClient, Integrity, LedgerCall, LedgerQueryClient,
    MemoryLedger, Preferences, RetryPolicy, TargetBehavior,
};
use afterlife_core::namespace::IDENTITY_TAG;
use serde_json::json;

const QUERY: &str = "https://query.example/graphql";
const GATEWAY: &str = "https://gateway.example";

fn clients(ledger: &Arc<MemoryLedger>) -> (LedgerQueryClient, DocumentFetchClient) {
    let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(500));
    (
        LedgerQueryClient::new(ledger.clone(), vec![QUERY.to_string()], policy),
        DocumentFetchClient::new(ledger.clone(), vec![GATEWAY.to_string()], policy),
    )
}

/// The same shape `afterlife publish` reads from disk.
fn request_json(self_id: &str, parent: serde_json::Value) -> PublishRequest {
    serde_json::from_value(json!({
        "self_id": self_id,
        "name": "Grace",
        "ideas": [
            {"idea_id": "compiler", "title": "A-0", "year": 1952},
            {"idea_id": "cobol", "title": "COBOL"}
        ],
        "edges": [
            {"from_idea_id": "cobol", "to_idea_id": "compiler", "type": "derived-from"}
        ],
        "parent": parent
    }))
    .expect("publish request should deserialize")
}

async fn publish(ledger: &Arc<MemoryLedger>, request: &PublishRequest) -> afterlife_chain::PublishOutcome {
    let (query, fetch) = clients(ledger);
    Publisher::new(ledger.clone(), query, fetch)
        .publish(request)
        .await
        .expect("publish should succeed")
}

// ============================================================================
// Publish → file → verify
// ============================================================================

#[tokio::test]
async fn test_published_chain_survives_ledger_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let ledger = Arc::new(MemoryLedger::new());
    let outcome = publish(&ledger, &request_json("self-grace", json!({"mode": "none"}))).await;
    ledger.save(&path).unwrap();

    let reloaded = Arc::new(MemoryLedger::load(&path).unwrap());
    assert_eq!(reloaded.len(), ledger.len());

    let (query, fetch) = clients(&reloaded);
    let report = ChainVerifier::new(query, fetch).verify_self("self-grace").await;

    assert!(report.ok, "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    assert_eq!(report.head.as_ref().unwrap().tx_id, outcome.head_tx);
    assert_eq!(report.snapshot.as_ref().unwrap().tx_id, outcome.snapshot_tx);
    assert_eq!(report.ideas.len(), 2);
    for idea in &report.ideas {
        assert!(
            matches!(idea.integrity, Some(Integrity::Verified { .. })),
            "{} integrity: {:?}",
            idea.idea_id,
            idea.integrity
        );
    }
}

#[tokio::test]
async fn test_missing_ledger_file_loads_empty() {
    let dir = tempdir().unwrap();
    let ledger = MemoryLedger::load(&dir.path().join("absent.json")).unwrap();
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_republish_links_parent_across_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let first_ledger = Arc::new(MemoryLedger::new());
    let first = publish(&first_ledger, &request_json("self-grace", json!({"mode": "none"}))).await;
    first_ledger.save(&path).unwrap();

    let ledger = Arc::new(MemoryLedger::load(&path).unwrap());
    let second = publish(&ledger, &request_json("self-grace", json!({"mode": "auto"}))).await;
    assert_eq!(second.parent_snapshot_tx.as_deref(), Some(first.snapshot_tx.as_str()));

    let (query, fetch) = clients(&ledger);
    let latest = query.latest_head("self-grace").await.unwrap().unwrap();
    assert_eq!(latest.id, second.head_tx);
    assert_eq!(latest.tag_index().first(IDENTITY_TAG), Some("self-grace"));

    let lineage = snapshot_lineage(&fetch, &second.snapshot_tx, 8).await;
    assert_eq!(lineage.stop, LineageStop::Root);
    let txs: Vec<_> = lineage.entries.iter().map(|e| e.tx_id.as_str()).collect();
    assert_eq!(txs, vec![second.snapshot_tx.as_str(), first.snapshot_tx.as_str()]);

    let history = head_history(&query, &fetch, "self-grace").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].record.id, second.head_tx);
    assert!(history.iter().all(|v| v.head.is_some()));
}

#[tokio::test]
async fn test_existing_idea_tx_is_reused_not_uploaded() {
    let ledger = Arc::new(MemoryLedger::new());
    let first = publish(&ledger, &request_json("self-grace", json!({"mode": "none"}))).await;
    let compiler_tx = first.ideas.iter().find(|i| i.idea_id == "compiler").unwrap().tx_id.clone();

    let mut request = request_json("self-grace", json!({"mode": "auto"}));
    request.ideas[0] = IdeaDraft::existing("compiler", compiler_tx.clone());
    let before = ledger.len();
    let second = publish(&ledger, &request).await;

    let reused = second.ideas.iter().find(|i| i.idea_id == "compiler").unwrap();
    assert!(!reused.uploaded);
    assert_eq!(reused.tx_id, compiler_tx);
    // cobol idea, snapshot, head
    assert_eq!(ledger.len(), before + 3);
}

// ============================================================================
// Configuration → fallback order
// ============================================================================

#[tokio::test]
async fn test_preferred_gateway_is_tried_first_and_falls_back() {
    let dir = tempdir().unwrap();
    let prefs_path = dir.path().join("preferences.json");

    let mut prefs = Preferences::default();
    prefs.set_gateway("https://mine.example/").unwrap();
    prefs.save(&prefs_path).unwrap();

    let base = ClientConfig::from_lookup(|key| match key {
        "AFTERLIFE_QUERY_ENDPOINTS" => Some(QUERY.to_string()),
        "AFTERLIFE_GATEWAYS" => Some(GATEWAY.to_string()),
        "AFTERLIFE_RETRY_DELAY_MS" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();
    let config = Preferences::load(&prefs_path).unwrap().apply(base);
    assert_eq!(config.gateways, vec!["https://mine.example", GATEWAY]);
    assert_eq!(
        config.query_endpoints,
        vec!["https://mine.example/graphql", QUERY]
    );

    let ledger = Arc::new(MemoryLedger::new());
    let outcome = publish(&ledger, &request_json("self-grace", json!({"mode": "none"}))).await;
    ledger.set_behavior("https://mine.example", TargetBehavior::Fail(AttemptError::Status(502)));
    ledger.set_behavior(
        "https://mine.example/graphql",
        TargetBehavior::Fail(AttemptError::Network("connection refused".into())),
    );
    ledger.clear_calls();

    let query = LedgerQueryClient::from_config(ledger.clone(), &config);
    let fetch = DocumentFetchClient::from_config(ledger.clone(), &config);
    let report = ChainVerifier::new(query, fetch).verify_self("self-grace").await;

    assert!(report.ok, "errors: {:?}", report.errors);
    assert_eq!(report.head.as_ref().unwrap().tx_id, outcome.head_tx);

    let calls = ledger.calls();
    let first_get = calls
        .iter()
        .find(|c| matches!(c, LedgerCall::Get { .. }))
        .unwrap();
    assert!(matches!(first_get, LedgerCall::Get { gateway, .. } if gateway == "https://mine.example"));
    assert!(ledger.calls_to(GATEWAY) > 0);
    assert!(ledger.calls_to(QUERY) > 0);
}

#[test]
fn test_invalid_environment_is_rejected() {
    let err = ClientConfig::from_lookup(|key| match key {
        "AFTERLIFE_GATEWAYS" => Some("ftp://files.example".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("AFTERLIFE_GATEWAYS"), "{err}");
}
