//! In-memory ledger.
//!
//! Implements all three transport seams ([`QueryTransport`],
//! [`GatewayTransport`], [`UploadService`]) over one shared state, so the
//! query, fetch and publish paths can run end to end without a network.
//!
//! Per-endpoint [`TargetBehavior`]s inject failures, canned responses or
//! stalls, and every call is recorded for inspection. The ledger can be
//! loaded from and saved to a JSON fixture file.

use crate::retry::AttemptError;
use crate::transport::{GatewayResponse, GatewayTransport, QueryTransport, UploadError, UploadService};
use afterlife_core::digest::sha256_hex;
use afterlife_core::{Tag, TxRecord};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_OWNER: &str = "memory-ledger-owner";
const DEFAULT_FIRST: usize = 100;

/// Override for one endpoint or gateway, keyed by its exact URL.
#[derive(Debug, Clone)]
pub enum TargetBehavior {
    Fail(AttemptError),
    /// Serve these bytes verbatim, whatever was asked.
    Respond(Vec<u8>),
    /// Sleep, then answer normally.
    Stall(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Query { endpoint: String },
    Get { gateway: String, tx_id: String },
    Upload { tx_id: String },
}

#[derive(Debug, Clone)]
struct Payload {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Insertion order; queries sort a copy.
    records: Vec<TxRecord>,
    payloads: HashMap<String, Payload>,
    owner_address: String,
    next_height: u64,
    pending_uploads: bool,
    reject_uploads: Option<String>,
}

pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    behaviors: RwLock<HashMap<String, TargetBehavior>>,
    calls: Mutex<Vec<LedgerCall>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                owner_address: DEFAULT_OWNER.to_string(),
                next_height: 1,
                ..LedgerState::default()
            }),
            behaviors: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Add a record with no retrievable payload.
    pub fn put_record(&self, record: TxRecord) {
        let mut state = self.state.write();
        if let Some(h) = record.block_height {
            state.next_height = state.next_height.max(h + 1);
        }
        state.records.push(record);
    }

    pub fn put(&self, record: TxRecord, bytes: Vec<u8>) {
        self.state.write().payloads.insert(
            record.id.clone(),
            Payload {
                bytes,
                content_type: None,
            },
        );
        self.put_record(record);
    }

    pub fn put_json(&self, record: TxRecord, document: &Value) {
        self.put(record, document.to_string().into_bytes());
    }

    /// Payload only, not discoverable by query.
    pub fn put_payload(&self, tx_id: &str, bytes: Vec<u8>) {
        self.state.write().payloads.insert(
            tx_id.to_string(),
            Payload {
                bytes,
                content_type: None,
            },
        );
    }

    pub fn set_owner(&self, owner_address: &str) {
        self.state.write().owner_address = owner_address.to_string();
    }

    /// New uploads land without a block until [`MemoryLedger::confirm_all`].
    pub fn set_pending_uploads(&self, pending: bool) {
        self.state.write().pending_uploads = pending;
    }

    pub fn reject_uploads(&self, reason: Option<&str>) {
        self.state.write().reject_uploads = reason.map(str::to_string);
    }

    /// Give every unconfirmed record the next block height.
    pub fn confirm_all(&self) {
        let mut state = self.state.write();
        let mut height = state.next_height;
        for record in state.records.iter_mut().filter(|r| r.block_height.is_none()) {
            record.block_height = Some(height);
            height += 1;
        }
        state.next_height = height;
    }

    pub fn set_behavior(&self, target: &str, behavior: TargetBehavior) {
        self.behaviors.write().insert(target.to_string(), behavior);
    }

    pub fn clear_behavior(&self, target: &str) {
        self.behaviors.write().remove(target);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Query and get calls made against one endpoint or gateway.
    pub fn calls_to(&self, target: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| match call {
                LedgerCall::Query { endpoint } => endpoint == target,
                LedgerCall::Get { gateway, .. } => gateway == target,
                LedgerCall::Upload { .. } => false,
            })
            .count()
    }

    pub fn record(&self, tx_id: &str) -> Option<TxRecord> {
        self.state.read().records.iter().find(|r| r.id == tx_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// A missing file yields an empty ledger.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let ledger = Self::new();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => return Err(e),
        };
        let file: LedgerFile = serde_json::from_str(&text)?;
        {
            let mut state = ledger.state.write();
            if !file.owner_address.is_empty() {
                state.owner_address = file.owner_address;
            }
            state.next_height = state.next_height.max(file.next_height);
        }
        for stored in file.transactions {
            let bytes = match (stored.body, stored.raw) {
                (Some(body), _) => Some(body.to_string().into_bytes()),
                (None, Some(raw)) => Some(raw),
                (None, None) => None,
            };
            if let Some(bytes) = bytes {
                ledger.state.write().payloads.insert(
                    stored.record.id.clone(),
                    Payload {
                        bytes,
                        content_type: stored.content_type,
                    },
                );
            }
            ledger.put_record(stored.record);
        }
        Ok(ledger)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let file = {
            let state = self.state.read();
            LedgerFile {
                owner_address: state.owner_address.clone(),
                next_height: state.next_height,
                transactions: state
                    .records
                    .iter()
                    .map(|record| {
                        let payload = state.payloads.get(&record.id);
                        // JSON is stored inline only when it re-serializes to the same bytes.
                        let body = payload
                            .and_then(|p| serde_json::from_slice::<Value>(&p.bytes).ok())
                            .filter(|v| payload.is_some_and(|p| v.to_string().as_bytes() == p.bytes));
                        let raw = match (&body, payload) {
                            (None, Some(p)) => Some(p.bytes.clone()),
                            _ => None,
                        };
                        StoredTx {
                            record: record.clone(),
                            content_type: payload.and_then(|p| p.content_type.clone()),
                            body,
                            raw,
                        }
                    })
                    .collect(),
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&file)?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn behavior(&self, target: &str) -> Option<TargetBehavior> {
        self.behaviors.read().get(target).cloned()
    }

    fn answer_query(&self, body: &Value) -> Value {
        let vars = body.get("variables").cloned().unwrap_or(Value::Null);
        let ids: Option<Vec<&str>> = vars
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect());
        let filters: Vec<(&str, Vec<&str>)> = vars
            .get("tags")
            .and_then(Value::as_array)
            .map(|filters| {
                filters
                    .iter()
                    .filter_map(|f| {
                        let name = f.get("name")?.as_str()?;
                        let values = f.get("values")?.as_array()?;
                        Some((name, values.iter().filter_map(Value::as_str).collect()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let first = vars
            .get("first")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_FIRST);
        let start = vars
            .get("after")
            .and_then(Value::as_str)
            .and_then(|c| c.parse::<usize>().ok())
            .map(|c| c + 1)
            .unwrap_or(0);

        let state = self.state.read();
        let mut matched: Vec<&TxRecord> = state
            .records
            .iter()
            .filter(|r| ids.as_ref().map_or(true, |ids| ids.contains(&r.id.as_str())))
            .filter(|r| {
                filters.iter().all(|(name, values)| {
                    r.tags
                        .iter()
                        .any(|t| t.name == *name && values.contains(&t.value.as_str()))
                })
            })
            .collect();
        matched.sort_by_key(|r| std::cmp::Reverse(r.sort_height()));

        let edges: Vec<Value> = matched
            .iter()
            .enumerate()
            .skip(start)
            .take(first)
            .map(|(i, r)| json!({"cursor": i.to_string(), "node": node_json(r)}))
            .collect();
        let has_next_page = start + edges.len() < matched.len();

        json!({
            "data": {"transactions": {
                "pageInfo": {"hasNextPage": has_next_page},
                "edges": edges,
            }}
        })
    }
}

fn node_json(record: &TxRecord) -> Value {
    let block = match record.block_height {
        Some(height) => json!({"height": height, "timestamp": record.block_timestamp}),
        None => Value::Null,
    };
    json!({
        "id": record.id,
        "owner": {"address": record.owner_address},
        "block": block,
        "tags": record.tags,
    })
}

#[async_trait]
impl QueryTransport for MemoryLedger {
    async fn post_graphql(&self, endpoint: &str, body: &Value) -> Result<Value, AttemptError> {
        self.calls.lock().push(LedgerCall::Query {
            endpoint: endpoint.to_string(),
        });
        match self.behavior(endpoint) {
            Some(TargetBehavior::Fail(err)) => return Err(err),
            Some(TargetBehavior::Respond(bytes)) => {
                return serde_json::from_slice(&bytes)
                    .map_err(|e| AttemptError::Malformed(e.to_string()));
            }
            Some(TargetBehavior::Stall(pause)) => tokio::time::sleep(pause).await,
            None => {}
        }
        Ok(self.answer_query(body))
    }
}

#[async_trait]
impl GatewayTransport for MemoryLedger {
    async fn get(&self, gateway: &str, tx_id: &str) -> Result<GatewayResponse, AttemptError> {
        self.calls.lock().push(LedgerCall::Get {
            gateway: gateway.to_string(),
            tx_id: tx_id.to_string(),
        });
        match self.behavior(gateway) {
            Some(TargetBehavior::Fail(err)) => return Err(err),
            Some(TargetBehavior::Respond(bytes)) => {
                return Ok(GatewayResponse {
                    bytes,
                    content_type: None,
                });
            }
            Some(TargetBehavior::Stall(pause)) => tokio::time::sleep(pause).await,
            None => {}
        }
        self.state
            .read()
            .payloads
            .get(tx_id)
            .map(|p| GatewayResponse {
                bytes: p.bytes.clone(),
                content_type: p.content_type.clone(),
            })
            .ok_or(AttemptError::Status(404))
    }
}

#[async_trait]
impl UploadService for MemoryLedger {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        tags: &[Tag],
    ) -> Result<String, UploadError> {
        let tx_id = {
            let mut state = self.state.write();
            if let Some(reason) = &state.reject_uploads {
                return Err(UploadError::Rejected(reason.clone()));
            }

            let mut seed = bytes.clone();
            seed.extend_from_slice(&state.next_height.to_be_bytes());
            seed.extend_from_slice(&(state.records.len() as u64).to_be_bytes());
            let tx_id = sha256_hex(&seed)[..43].to_string();

            let block_height = if state.pending_uploads {
                None
            } else {
                let h = state.next_height;
                state.next_height += 1;
                Some(h)
            };
            let record = TxRecord {
                id: tx_id.clone(),
                owner_address: state.owner_address.clone(),
                block_height,
                block_timestamp: None,
                tags: tags.to_vec(),
            };
            state.payloads.insert(
                tx_id.clone(),
                Payload {
                    bytes,
                    content_type: Some(content_type.to_string()),
                },
            );
            state.records.push(record);
            tx_id
        };

        self.calls.lock().push(LedgerCall::Upload {
            tx_id: tx_id.clone(),
        });
        tracing::debug!(tx_id = %tx_id, "stored upload in memory ledger");
        Ok(tx_id)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    owner_address: String,
    #[serde(default)]
    next_height: u64,
    #[serde(default)]
    transactions: Vec<StoredTx>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTx {
    #[serde(flatten)]
    record: TxRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    /// Payload when it is JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
    /// Payload bytes otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(vars: Value) -> Value {
        json!({"query": "q", "variables": vars})
    }

    fn seeded() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.put_record(TxRecord::new("a").with_height(5).with_tag("Entity", "Idea"));
        ledger.put_record(TxRecord::new("b").with_height(9).with_tag("Entity", "Idea"));
        ledger.put_record(TxRecord::new("c").with_tag("Entity", "Idea"));
        ledger.put_record(TxRecord::new("d").with_height(7).with_tag("Entity", "SelfHead"));
        ledger
    }

    fn ids(response: &Value) -> Vec<String> {
        response["data"]["transactions"]["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["node"]["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn filters_by_tags_and_sorts_by_height() {
        let ledger = seeded();
        let response = ledger.answer_query(&body(json!({
            "tags": [{"name": "Entity", "values": ["Idea"]}],
            "first": 10,
        })));
        assert_eq!(ids(&response), vec!["b", "a", "c"]);
        assert!(response["data"]["transactions"]["edges"][2]["node"]["block"].is_null());
    }

    #[test]
    fn pages_with_cursors() {
        let ledger = seeded();
        let page1 = ledger.answer_query(&body(json!({"first": 2})));
        assert_eq!(ids(&page1), vec!["b", "d"]);
        assert_eq!(page1["data"]["transactions"]["pageInfo"]["hasNextPage"], true);

        let cursor = page1["data"]["transactions"]["edges"][1]["cursor"].clone();
        let page2 = ledger.answer_query(&body(json!({"first": 2, "after": cursor})));
        assert_eq!(ids(&page2), vec!["a", "c"]);
        assert_eq!(page2["data"]["transactions"]["pageInfo"]["hasNextPage"], false);
    }

    #[test]
    fn id_query_ignores_unknown_ids() {
        let ledger = seeded();
        let response = ledger.answer_query(&body(json!({"ids": ["d", "zzz"], "first": 5})));
        assert_eq!(ids(&response), vec!["d"]);
    }

    #[tokio::test]
    async fn uploads_get_increasing_heights() {
        let ledger = MemoryLedger::new();
        let first = ledger.upload(b"{}".to_vec(), "application/json", &[]).await.unwrap();
        let second = ledger.upload(b"{}".to_vec(), "application/json", &[]).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        let h1 = ledger.record(&first).unwrap().block_height.unwrap();
        let h2 = ledger.record(&second).unwrap().block_height.unwrap();
        assert!(h2 > h1);

        ledger.set_pending_uploads(true);
        let pending = ledger.upload(b"[]".to_vec(), "application/json", &[]).await.unwrap();
        assert_eq!(ledger.record(&pending).unwrap().block_height, None);
        ledger.confirm_all();
        assert!(ledger.record(&pending).unwrap().block_height.unwrap() > h2);

        ledger.reject_uploads(Some("insufficient funds"));
        assert!(matches!(
            ledger.upload(vec![], "text/plain", &[]).await,
            Err(UploadError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn gateway_behaviors_and_call_log() {
        let ledger = MemoryLedger::new();
        ledger.put_payload("tx", b"payload".to_vec());
        ledger.set_behavior("gw1", TargetBehavior::Fail(AttemptError::Status(503)));

        assert_eq!(ledger.get("gw1", "tx").await, Err(AttemptError::Status(503)));
        assert_eq!(ledger.get("gw2", "tx").await.unwrap().bytes, b"payload");
        assert_eq!(ledger.get("gw2", "missing").await, Err(AttemptError::Status(404)));
        assert_eq!(ledger.calls_to("gw1"), 1);
        assert_eq!(ledger.calls_to("gw2"), 2);
    }

    #[test]
    fn fixture_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = MemoryLedger::new();
        ledger.set_owner("owner-x");
        ledger.put_json(
            TxRecord::new("json-tx").with_height(3).with_tag("Entity", "Idea"),
            &json!({"idea_id": "i1"}),
        );
        ledger.put(TxRecord::new("raw-tx").with_height(4), vec![0x1f, 0x8b, 0x00]);
        ledger.put_record(TxRecord::new("bare-tx"));
        ledger.save(&path).unwrap();

        let loaded = MemoryLedger::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.record("json-tx").unwrap().tags.len(), 1);
        let state = loaded.state.read();
        assert_eq!(state.owner_address, "owner-x");
        assert_eq!(state.payloads["raw-tx"].bytes, vec![0x1f, 0x8b, 0x00]);
        assert!(!state.payloads.contains_key("bare-tx"));
        assert_eq!(state.next_height, 5);

        assert!(MemoryLedger::load(&dir.path().join("absent.json")).unwrap().is_empty());
    }
}
