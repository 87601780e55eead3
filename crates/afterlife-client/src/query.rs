//! Ledger Query Client: tag/id queries against redundant GraphQL endpoints.
//!
//! Every failure mode of a single endpoint (network, non-2xx, malformed JSON,
//! missing `data.transactions` envelope, declared GraphQL `errors`) is
//! treated the same: fall back to the next endpoint. An empty edge list is a
//! successful "no match".

use crate::config::ClientConfig;
use crate::retry::{AttemptError, FallbackError, RetryPolicy};
use crate::transport::QueryTransport;
use afterlife_core::namespace::{Entity, IDENTITY_TAG, NAMESPACE_TAGS, TAG_ENTITY};
use afterlife_core::{latest_for, latest_per_identity, versions_for, Tag, TxRecord};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// GraphQL document shared by the tag and id query forms; unused variables
/// are sent as `null`.
pub const TRANSACTIONS_QUERY: &str = r#"query AfterlifeTransactions($ids: [ID!], $tags: [TagFilter!], $first: Int!, $after: String) {
  transactions(ids: $ids, tags: $tags, first: $first, after: $after, sort: HEIGHT_DESC) {
    pageInfo { hasNextPage }
    edges {
      cursor
      node {
        id
        owner { address }
        block { height timestamp }
        tags { name value }
      }
    }
  }
}"#;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGES: usize = 10;

// ============================================================================
// Query description
// ============================================================================

/// Matches records carrying `name` with any of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFilter {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxQuery {
    pub tags: Vec<TagFilter>,
    pub ids: Vec<String>,
    pub first: usize,
    pub after: Option<String>,
}

impl Default for TxQuery {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            ids: Vec::new(),
            first: DEFAULT_PAGE_SIZE,
            after: None,
        }
    }
}

impl TxQuery {
    /// Namespace filters plus `Entity = entity`.
    pub fn entity(entity: Entity) -> Self {
        let mut query = Self::default();
        for (name, value) in NAMESPACE_TAGS {
            query = query.with_tag(name, value);
        }
        query.with_tag(TAG_ENTITY, entity.as_str())
    }

    pub fn ids(ids: &[String]) -> Self {
        Self {
            ids: ids.to_vec(),
            first: ids.len().max(1),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        match self.tags.iter_mut().find(|f| f.name == name) {
            Some(filter) => filter.values.push(value.to_string()),
            None => self.tags.push(TagFilter {
                name: name.to_string(),
                values: vec![value.to_string()],
            }),
        }
        self
    }

    pub fn first(mut self, first: usize) -> Self {
        self.first = first;
        self
    }

    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.after = cursor;
        self
    }

    pub fn to_request_body(&self) -> Value {
        json!({
            "query": TRANSACTIONS_QUERY,
            "variables": {
                "ids": if self.ids.is_empty() { Value::Null } else { json!(self.ids) },
                "tags": if self.tags.is_empty() { Value::Null } else { json!(self.tags) },
                "first": self.first,
                "after": self.after,
            }
        })
    }
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub records: Vec<TxRecord>,
    pub has_next_page: bool,
    /// Cursor of the last edge, used to request the following page.
    pub end_cursor: Option<String>,
}

/// Decode a `transactions` response envelope.
pub fn parse_transactions(response: &Value) -> Result<QueryPage, AttemptError> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
                .collect();
            return Err(AttemptError::Declared(messages.join("; ")));
        }
    }

    let transactions = response
        .pointer("/data/transactions")
        .filter(|t| t.is_object())
        .ok_or_else(|| AttemptError::Malformed("missing data.transactions".to_string()))?;

    let edges = transactions
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| AttemptError::Malformed("transactions.edges is not an array".to_string()))?;

    let mut page = QueryPage {
        has_next_page: transactions
            .pointer("/pageInfo/hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        ..QueryPage::default()
    };

    for (index, edge) in edges.iter().enumerate() {
        let node = edge
            .get("node")
            .ok_or_else(|| AttemptError::Malformed(format!("edge {index} has no node")))?;
        page.records.push(parse_node(node, index)?);
        if let Some(cursor) = edge.get("cursor").and_then(Value::as_str) {
            page.end_cursor = Some(cursor.to_string());
        }
    }

    Ok(page)
}

fn parse_node(node: &Value, index: usize) -> Result<TxRecord, AttemptError> {
    let id = node
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AttemptError::Malformed(format!("edge {index} node has no id")))?;

    let block = node.get("block").filter(|b| b.is_object());
    let tags = node
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| {
                    Some(Tag::new(
                        t.get("name")?.as_str()?,
                        t.get("value")?.as_str()?,
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(TxRecord {
        id: id.to_string(),
        owner_address: node
            .pointer("/owner/address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        block_height: block.and_then(|b| b.get("height")).and_then(Value::as_u64),
        block_timestamp: block.and_then(|b| b.get("timestamp")).and_then(Value::as_u64),
        tags,
    })
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("no query endpoints configured")]
    NoEndpoints,
    #[error("ledger query failed after {attempts} endpoints; last ({endpoint}): {last}")]
    Exhausted {
        attempts: usize,
        endpoint: String,
        last: AttemptError,
    },
}

impl From<FallbackError> for QueryError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::NoTargets => QueryError::NoEndpoints,
            FallbackError::Exhausted {
                attempts,
                target,
                last,
            } => QueryError::Exhausted {
                attempts,
                endpoint: target,
                last,
            },
        }
    }
}

#[derive(Clone)]
pub struct LedgerQueryClient {
    transport: Arc<dyn QueryTransport>,
    endpoints: Vec<String>,
    policy: RetryPolicy,
    page_size: usize,
    max_pages: usize,
}

impl LedgerQueryClient {
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        endpoints: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            endpoints,
            policy,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn from_config(transport: Arc<dyn QueryTransport>, config: &ClientConfig) -> Self {
        Self::new(
            transport,
            config.query_endpoints.clone(),
            config.retry_policy(),
        )
        .with_paging(config.page_size, config.max_pages)
    }

    pub fn with_paging(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// One page of results, falling back across endpoints.
    pub async fn query(&self, query: &TxQuery) -> Result<QueryPage, QueryError> {
        let body = query.to_request_body();
        let transport = &self.transport;
        let body = &body;

        let attempted = self
            .policy
            .run(&self.endpoints, |endpoint| async move {
                let response = transport.post_graphql(&endpoint, body).await?;
                parse_transactions(&response)
            })
            .await?;

        tracing::debug!(
            endpoint = %attempted.target,
            records = attempted.value.records.len(),
            "ledger query answered"
        );
        Ok(attempted.value)
    }

    /// Follow cursors until the last page or `max_pages`, whichever is first.
    pub async fn query_all(&self, query: &TxQuery) -> Result<Vec<TxRecord>, QueryError> {
        let mut records = Vec::new();
        let mut next = query.clone();

        for _ in 0..self.max_pages {
            let page = self.query(&next).await?;
            let exhausted = !page.has_next_page || page.end_cursor.is_none();
            records.extend(page.records);
            if exhausted {
                return Ok(records);
            }
            next = next.after(page.end_cursor);
        }

        tracing::warn!(max_pages = self.max_pages, "query stopped at page limit");
        Ok(records)
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<TxRecord>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for chunk in ids.chunks(self.page_size) {
            records.extend(self.query_all(&TxQuery::ids(chunk)).await?);
        }
        Ok(records)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<TxRecord>, QueryError> {
        let records = self.find_by_ids(&[id.to_string()]).await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    /// Highest-block record per identity among everything matching `query`.
    pub async fn latest_by_tags(
        &self,
        query: &TxQuery,
        identity_tag: &str,
    ) -> Result<Vec<TxRecord>, QueryError> {
        let records = self.query_all(&query.clone().first(self.page_size)).await?;
        Ok(latest_per_identity(&records, identity_tag))
    }

    /// Current head transaction of one Self, if any is discoverable.
    pub async fn latest_head(&self, self_id: &str) -> Result<Option<TxRecord>, QueryError> {
        let query = TxQuery::entity(Entity::SelfHead)
            .with_tag(IDENTITY_TAG, self_id)
            .first(self.page_size);
        let page = self.query(&query).await?;
        Ok(latest_for(&page.records, IDENTITY_TAG, self_id))
    }

    /// Latest head of every discoverable Self, newest first.
    pub async fn list_heads(&self) -> Result<Vec<TxRecord>, QueryError> {
        self.latest_by_tags(&TxQuery::entity(Entity::SelfHead), IDENTITY_TAG)
            .await
    }

    /// Every head version of one Self, newest first.
    pub async fn head_versions(&self, self_id: &str) -> Result<Vec<TxRecord>, QueryError> {
        let query = TxQuery::entity(Entity::SelfHead)
            .with_tag(IDENTITY_TAG, self_id)
            .first(self.page_size);
        let records = self.query_all(&query).await?;
        Ok(versions_for(&records, IDENTITY_TAG, self_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_query_carries_namespace_filters() {
        let q = TxQuery::entity(Entity::Idea).with_tag(IDENTITY_TAG, "s1");
        assert_eq!(q.tags.len(), 5);
        let body = q.to_request_body();
        assert!(body["variables"]["ids"].is_null());
        assert_eq!(body["variables"]["tags"][3]["name"], "Entity");
        assert_eq!(body["variables"]["tags"][4]["values"][0], "s1");
    }

    #[test]
    fn repeated_tag_name_merges_values() {
        let q = TxQuery::default().with_tag("Entity", "Idea").with_tag("Entity", "SelfHead");
        assert_eq!(q.tags.len(), 1);
        assert_eq!(q.tags[0].values, vec!["Idea", "SelfHead"]);
    }

    #[test]
    fn parses_edges_and_page_info() {
        let response = json!({
            "data": {"transactions": {
                "pageInfo": {"hasNextPage": true},
                "edges": [
                    {"cursor": "c1", "node": {
                        "id": "tx1",
                        "owner": {"address": "owner-1"},
                        "block": {"height": 42, "timestamp": 1700000000},
                        "tags": [{"name": "Self-Id", "value": "s"}, {"name": "broken"}]
                    }},
                    {"cursor": "c2", "node": {"id": "tx2", "block": null, "tags": []}}
                ]
            }}
        });
        let page = parse_transactions(&response).unwrap();
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("c2"));
        assert_eq!(page.records[0].block_height, Some(42));
        assert_eq!(page.records[0].owner_address, "owner-1");
        assert_eq!(page.records[0].tags.len(), 1);
        assert_eq!(page.records[1].block_height, None);
    }

    #[test]
    fn empty_edges_is_success() {
        let page = parse_transactions(&json!({"data": {"transactions": {"edges": []}}})).unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_next_page);
    }

    #[test]
    fn declared_errors_and_missing_envelope_fail() {
        let declared = json!({"errors": [{"message": "bad tag"}], "data": null});
        assert_eq!(
            parse_transactions(&declared),
            Err(AttemptError::Declared("bad tag".to_string()))
        );
        assert!(matches!(
            parse_transactions(&json!({"data": {}})),
            Err(AttemptError::Malformed(_))
        ));
        assert!(matches!(
            parse_transactions(&json!({"data": {"transactions": {"edges": [{"node": {}}]}}})),
            Err(AttemptError::Malformed(_))
        ));
    }
}
