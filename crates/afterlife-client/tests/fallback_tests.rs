//! Query and fetch clients over the in-memory ledger: fallback order,
//! parse policy, integrity and paging.

use afterlife_client::{
    AttemptError, DocumentFetchClient, FetchError, FetchHints, Integrity, LedgerCall,
    LedgerQueryClient, MemoryLedger, QueryError, RetryPolicy, TargetBehavior, TxQuery,
};
use afterlife_core::digest::sha256_hex;
use afterlife_core::namespace::{Entity, IDENTITY_TAG, NAMESPACE_TAGS, TAG_ENTITY};
use afterlife_core::{Tag, TxRecord};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(250))
}

fn urls(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn head_record(id: &str, self_id: &str, height: Option<u64>) -> TxRecord {
    let mut record = TxRecord::new(id);
    record.block_height = height;
    for (name, value) in NAMESPACE_TAGS {
        record = record.with_tag(name, value);
    }
    record
        .with_tag(TAG_ENTITY, Entity::SelfHead.as_str())
        .with_tag(IDENTITY_TAG, self_id)
}

fn query_client(ledger: &Arc<MemoryLedger>, endpoints: &[&str]) -> LedgerQueryClient {
    LedgerQueryClient::new(ledger.clone(), urls(endpoints), policy())
}

fn fetch_client(ledger: &Arc<MemoryLedger>, gateways: &[&str]) -> DocumentFetchClient {
    DocumentFetchClient::new(ledger.clone(), urls(gateways), policy())
}

// ============================================================================
// Query fallback
// ============================================================================

#[tokio::test]
async fn exhausted_query_makes_one_attempt_per_endpoint() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.set_behavior("q1", TargetBehavior::Fail(AttemptError::Network("refused".into())));
    ledger.set_behavior("q2", TargetBehavior::Fail(AttemptError::Status(500)));
    ledger.set_behavior("q3", TargetBehavior::Respond(br#"{"errors":[{"message":"rate limited"}]}"#.to_vec()));

    let err = query_client(&ledger, &["q1", "q2", "q3"])
        .query(&TxQuery::entity(Entity::SelfHead))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        QueryError::Exhausted {
            attempts: 3,
            endpoint: "q3".to_string(),
            last: AttemptError::Declared("rate limited".to_string()),
        }
    );
    assert_eq!(ledger.calls().len(), 3);
}

#[tokio::test]
async fn second_endpoint_answers_after_first_fails() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_record(head_record("h1", "self-a", Some(10)));
    ledger.set_behavior("q1", TargetBehavior::Respond(b"<html>bad gateway</html>".to_vec()));

    let page = query_client(&ledger, &["q1", "q2"])
        .query(&TxQuery::entity(Entity::SelfHead))
        .await
        .unwrap();

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].id, "h1");
    assert_eq!(
        ledger.calls(),
        vec![
            LedgerCall::Query { endpoint: "q1".into() },
            LedgerCall::Query { endpoint: "q2".into() },
        ]
    );
}

#[tokio::test]
async fn missing_envelope_falls_back() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_record(head_record("h1", "self-a", Some(10)));
    ledger.set_behavior("q1", TargetBehavior::Respond(br#"{"data":{}}"#.to_vec()));

    let page = query_client(&ledger, &["q1", "q2"])
        .query(&TxQuery::entity(Entity::SelfHead))
        .await
        .unwrap();
    assert_eq!(page.records[0].id, "h1");
}

#[tokio::test]
async fn empty_result_is_success_without_fallback() {
    let ledger = Arc::new(MemoryLedger::new());
    let page = query_client(&ledger, &["q1", "q2"])
        .query(&TxQuery::entity(Entity::Idea))
        .await
        .unwrap();
    assert!(page.records.is_empty());
    assert_eq!(ledger.calls_to("q2"), 0);
}

#[tokio::test]
async fn stalled_endpoint_times_out() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_record(head_record("h1", "self-a", Some(1)));
    ledger.set_behavior("slow", TargetBehavior::Stall(Duration::from_secs(10)));

    let client = LedgerQueryClient::new(
        ledger.clone(),
        urls(&["slow", "fast"]),
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(30)),
    );
    let head = client.latest_head("self-a").await.unwrap();
    assert_eq!(head.map(|r| r.id), Some("h1".to_string()));
}

#[tokio::test]
async fn no_endpoints_is_an_error() {
    let ledger = Arc::new(MemoryLedger::new());
    let err = query_client(&ledger, &[]).list_heads().await.unwrap_err();
    assert_eq!(err, QueryError::NoEndpoints);
}

// ============================================================================
// Resolution conveniences
// ============================================================================

#[tokio::test]
async fn latest_head_prefers_highest_block() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_record(head_record("tx1", "s", Some(10)));
    ledger.put_record(head_record("tx2", "s", Some(12)));
    ledger.put_record(head_record("pending", "s", None));
    ledger.put_record(head_record("other", "t", Some(50)));

    let client = query_client(&ledger, &["q1"]);
    let head = client.latest_head("s").await.unwrap().unwrap();
    assert_eq!(head.id, "tx2");

    let heads = client.list_heads().await.unwrap();
    let ids: Vec<&str> = heads.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["other", "tx2"]);

    let versions = client.head_versions("s").await.unwrap();
    let ids: Vec<&str> = versions.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["tx2", "tx1", "pending"]);

    assert!(client.latest_head("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn query_all_follows_cursors_up_to_page_limit() {
    let ledger = Arc::new(MemoryLedger::new());
    for i in 0..7u64 {
        ledger.put_record(head_record(&format!("h{i}"), &format!("s{i}"), Some(i + 1)));
    }

    let client = query_client(&ledger, &["q1"]).with_paging(3, 10);
    let all = client.query_all(&TxQuery::entity(Entity::SelfHead).first(3)).await.unwrap();
    assert_eq!(all.len(), 7);
    assert_eq!(all[0].id, "h6");
    assert_eq!(ledger.calls_to("q1"), 3);

    let capped = query_client(&ledger, &["q1"]).with_paging(3, 2);
    let some = capped.query_all(&TxQuery::entity(Entity::SelfHead).first(3)).await.unwrap();
    assert_eq!(some.len(), 6);
}

#[tokio::test]
async fn find_by_ids_returns_known_records() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_record(head_record("a", "s", Some(1)));
    ledger.put_record(head_record("b", "s", Some(2)));

    let client = query_client(&ledger, &["q1"]);
    let found = client
        .find_by_ids(&urls(&["a", "missing"]))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(client.find_by_id("b").await.unwrap().unwrap().block_height, Some(2));
    assert!(client.find_by_ids(&[]).await.unwrap().is_empty());
}

// ============================================================================
// Document fetch
// ============================================================================

#[tokio::test]
async fn first_gateway_throws_second_serves() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_payload("tx", br#"{"ok":true}"#.to_vec());
    ledger.set_behavior("gw1", TargetBehavior::Fail(AttemptError::Network("reset".into())));

    let (value, doc) = fetch_client(&ledger, &["gw1", "gw2"])
        .fetch_json("tx", &FetchHints::default())
        .await
        .unwrap();

    assert_eq!(value, json!({"ok": true}));
    assert_eq!(doc.gateway, "gw2");
    assert_eq!(doc.integrity, Integrity::NotApplicable);
    assert_eq!(ledger.calls().len(), 2);
}

#[tokio::test]
async fn parse_failure_is_not_retried_on_next_gateway() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_payload("tx", br#"{"ok":true}"#.to_vec());
    ledger.set_behavior("gw1", TargetBehavior::Respond(b"not json".to_vec()));

    let err = fetch_client(&ledger, &["gw1", "gw2"])
        .fetch_json("tx", &FetchHints::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse { ref gateway, .. } if gateway == "gw1"));
    assert_eq!(ledger.calls_to("gw2"), 0);
}

#[tokio::test]
async fn all_gateways_failing_reports_last() {
    let ledger = Arc::new(MemoryLedger::new());
    let err = fetch_client(&ledger, &["gw1", "gw2"])
        .fetch("absent", &FetchHints::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FetchError::Exhausted {
            tx_id: "absent".to_string(),
            attempts: 2,
            gateway: "gw2".to_string(),
            last: AttemptError::Status(404),
        }
    );
}

#[tokio::test]
async fn integrity_is_reported_not_raised() {
    let body = br#"{"idea_id":"i1"}"#.to_vec();
    let digest = sha256_hex(&body);
    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_payload("tx", body);
    let client = fetch_client(&ledger, &["gw1"]);

    let tagged = FetchHints::from_tags(&[Tag::new("Original-SHA256", &digest.to_uppercase())]);
    let doc = client.fetch("tx", &tagged).await.unwrap();
    assert_eq!(doc.integrity, Integrity::Verified { sha256: digest.clone() });

    let wrong = tagged.with_expected_sha256("00");
    let doc = client.fetch("tx", &wrong).await.unwrap();
    assert_eq!(
        doc.integrity,
        Integrity::Mismatch {
            expected: "00".to_string(),
            actual: digest,
        }
    );
}

#[tokio::test]
async fn gzip_payload_is_decoded_before_hashing() {
    let body = br#"{"idea_id":"i1","title":"compressed"}"#;
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(body).unwrap();
    let compressed = enc.finish().unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    ledger.put_payload("tx", compressed);
    let hints = FetchHints::from_tags(&[
        Tag::new("Content-Encoding", "gzip"),
        Tag::new("Original-SHA256", &sha256_hex(body)),
    ]);

    let (value, doc) = fetch_client(&ledger, &["gw1"])
        .fetch_json("tx", &hints)
        .await
        .unwrap();
    assert_eq!(value["title"], "compressed");
    assert!(matches!(doc.integrity, Integrity::Verified { .. }));

    let bad = FetchHints::from_tags(&[Tag::new("Stored-Encoding", "gzip")]);
    ledger.put_payload("plain", body.to_vec());
    let err = fetch_client(&ledger, &["gw1"]).fetch("plain", &bad).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { encoding: "gzip", .. }));
}
