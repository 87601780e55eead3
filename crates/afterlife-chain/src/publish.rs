//! Publish Orchestrator: Ideas -> Snapshot -> Head.
//!
//! The request is validated and the parent snapshot resolved before anything
//! is uploaded. Uploads then run strictly in order; a failed upload stops the
//! sequence and reports which entity failed. Convergence polling afterwards
//! is advisory: not seeing the new head yet is an outcome, not an error.

use afterlife_client::{DocumentFetchClient, FetchHints, LedgerQueryClient, UploadError, UploadService};
use afterlife_core::digest::sha256_hex;
use afterlife_core::namespace::{discovery_tags, TAG_CONTENT_TYPE, TAG_IDEA_ID, TAG_ORIGINAL_SHA256};
use afterlife_core::schema::{check_snapshot, head_snapshot_tx, SCHEMA_IDEA};
use afterlife_core::{EdgePolicy, Entity, ForkOf, Idea, IdeaEdge, IdeaRef, SelfHead, SelfSnapshot, Tag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const DEFAULT_CONVERGENCE_DELAY: Duration = Duration::from_secs(2);

const PENDING_TX: &str = "pending-upload";

// ============================================================================
// Request / outcome
// ============================================================================

/// An idea to publish. With `tx_id` set the idea is already on the ledger
/// and is only referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaDraft {
    pub idea_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Remaining document fields, carried verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IdeaDraft {
    pub fn new(idea_id: impl Into<String>) -> Self {
        Self {
            idea_id: idea_id.into(),
            tx_id: None,
            fields: Map::new(),
        }
    }

    pub fn existing(idea_id: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: Some(tx_id.into()),
            ..Self::new(idea_id)
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    fn to_idea(&self) -> Idea {
        Idea {
            idea_id: self.idea_id.clone(),
            schema: Some(SCHEMA_IDEA.to_string()),
            fields: self.fields.clone(),
        }
    }
}

/// How the new snapshot links to its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ParentLink {
    #[default]
    None,
    Explicit { tx: String },
    /// Use the snapshot of the current latest head, if there is one.
    #[serde(rename = "auto")]
    AutoDiscover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub self_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ideas: Vec<IdeaDraft>,
    #[serde(default)]
    pub edges: Vec<IdeaEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub parent: ParentLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<ForkOf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Convergence {
    /// No polling was requested.
    Skipped,
    Converged { attempts: u32 },
    NotConverged {
        attempts: u32,
        /// Latest head seen on the final attempt.
        observed: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedIdea {
    pub idea_id: String,
    pub tx_id: String,
    /// False when an existing tx id was reused.
    pub uploaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub self_id: String,
    pub ideas: Vec<PublishedIdea>,
    pub snapshot_tx: String,
    pub parent_snapshot_tx: Option<String>,
    pub head_tx: String,
    pub convergence: Convergence,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid publish request: {0}")]
    InvalidRequest(String),
    #[error("cannot discover parent snapshot: {0}")]
    ParentDiscovery(String),
    #[error("cannot encode {entity} document: {source}")]
    Encode {
        entity: Entity,
        source: serde_json::Error,
    },
    #[error("{entity} upload failed: {source}")]
    Upload { entity: Entity, source: UploadError },
}

// ============================================================================
// Publisher
// ============================================================================

pub struct Publisher {
    uploader: Arc<dyn UploadService>,
    query: LedgerQueryClient,
    fetch: DocumentFetchClient,
    poll_attempts: u32,
    poll_delay: Duration,
}

impl Publisher {
    pub fn new(
        uploader: Arc<dyn UploadService>,
        query: LedgerQueryClient,
        fetch: DocumentFetchClient,
    ) -> Self {
        Self {
            uploader,
            query,
            fetch,
            poll_attempts: 0,
            poll_delay: DEFAULT_CONVERGENCE_DELAY,
        }
    }

    /// Poll the latest head up to `attempts` times after publishing.
    pub fn with_convergence(mut self, attempts: u32, delay: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_delay = delay;
        self
    }

    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        validate_request(request)?;
        let parent_snapshot_tx = self.resolve_parent(request).await?;
        let self_id = request.self_id.as_str();

        // Ideas
        let mut ideas = Vec::with_capacity(request.ideas.len());
        for draft in &request.ideas {
            let published = match &draft.tx_id {
                Some(tx_id) => PublishedIdea {
                    idea_id: draft.idea_id.clone(),
                    tx_id: tx_id.clone(),
                    uploaded: false,
                },
                None => {
                    let document = draft.to_idea().to_document();
                    let idea_tag = Tag::new(TAG_IDEA_ID, draft.idea_id.as_str());
                    let tx_id = self
                        .upload(Entity::Idea, self_id, &document, vec![idea_tag])
                        .await?;
                    PublishedIdea {
                        idea_id: draft.idea_id.clone(),
                        tx_id,
                        uploaded: true,
                    }
                }
            };
            ideas.push(published);
        }

        // Snapshot
        let snapshot = SelfSnapshot {
            self_id: self_id.to_string(),
            parent_snapshot_tx: parent_snapshot_tx.clone(),
            ideas: ideas
                .iter()
                .map(|i| IdeaRef {
                    idea_id: i.idea_id.clone(),
                    tx_id: i.tx_id.clone(),
                })
                .collect(),
            edges: request.edges.clone(),
            notes: request.notes.clone(),
            created_at: Some(timestamp()),
        };
        let document = snapshot.to_document().map_err(|source| PublishError::Encode {
            entity: Entity::SelfSnapshot,
            source,
        })?;
        let snapshot_tx = self
            .upload(Entity::SelfSnapshot, self_id, &document, Vec::new())
            .await?;

        // Head
        let head = SelfHead {
            self_id: self_id.to_string(),
            name: request.name.clone(),
            description: request.description.clone(),
            snapshot_tx: snapshot_tx.clone(),
            fork_of: request.fork_of.clone(),
            owner_address: request.owner_address.clone(),
            updated_at: Some(timestamp()),
            links: request.links.clone(),
        };
        let document = head.to_document().map_err(|source| PublishError::Encode {
            entity: Entity::SelfHead,
            source,
        })?;
        let head_tx = self
            .upload(Entity::SelfHead, self_id, &document, Vec::new())
            .await?;

        tracing::info!(self_id, head_tx = %head_tx, snapshot_tx = %snapshot_tx, "published");
        let convergence = self.await_convergence(self_id, &head_tx).await;

        Ok(PublishOutcome {
            self_id: self_id.to_string(),
            ideas,
            snapshot_tx,
            parent_snapshot_tx,
            head_tx,
            convergence,
        })
    }

    async fn resolve_parent(&self, request: &PublishRequest) -> Result<Option<String>, PublishError> {
        match &request.parent {
            ParentLink::None => Ok(None),
            ParentLink::Explicit { tx } => Ok(Some(tx.clone())),
            ParentLink::AutoDiscover => {
                let head = self
                    .query
                    .latest_head(&request.self_id)
                    .await
                    .map_err(|e| PublishError::ParentDiscovery(e.to_string()))?;
                let Some(head) = head else {
                    tracing::debug!(self_id = %request.self_id, "no prior head; publishing root snapshot");
                    return Ok(None);
                };
                let (value, _) = self
                    .fetch
                    .fetch_json(&head.id, &FetchHints::from_tags(&head.tags))
                    .await
                    .map_err(|e| PublishError::ParentDiscovery(e.to_string()))?;
                head_snapshot_tx(&value)
                    .map(|tx| Some(tx.to_string()))
                    .ok_or_else(|| {
                        PublishError::ParentDiscovery(format!("head {} has no snapshot_tx", head.id))
                    })
            }
        }
    }

    async fn upload(
        &self,
        entity: Entity,
        self_id: &str,
        document: &Value,
        extra_tags: Vec<Tag>,
    ) -> Result<String, PublishError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|source| PublishError::Encode { entity, source })?;

        let mut tags = discovery_tags(entity, self_id);
        tags.push(Tag::new(TAG_CONTENT_TYPE, CONTENT_TYPE_JSON));
        tags.push(Tag::new(TAG_ORIGINAL_SHA256, sha256_hex(&bytes)));
        tags.extend(extra_tags);

        let tx_id = self
            .uploader
            .upload(bytes, CONTENT_TYPE_JSON, &tags)
            .await
            .map_err(|source| PublishError::Upload { entity, source })?;
        tracing::debug!(%entity, tx_id = %tx_id, "uploaded");
        Ok(tx_id)
    }

    async fn await_convergence(&self, self_id: &str, head_tx: &str) -> Convergence {
        if self.poll_attempts == 0 {
            return Convergence::Skipped;
        }

        let mut observed = None;
        for attempt in 1..=self.poll_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.poll_delay).await;
            }
            match self.query.latest_head(self_id).await {
                Ok(Some(record)) if record.id == head_tx => {
                    return Convergence::Converged { attempts: attempt };
                }
                Ok(found) => observed = found.map(|r| r.id),
                Err(e) => tracing::warn!(self_id, attempt, error = %e, "convergence poll failed"),
            }
        }

        tracing::warn!(self_id, head_tx, "new head not yet observed as latest");
        Convergence::NotConverged {
            attempts: self.poll_attempts,
            observed,
        }
    }
}

fn validate_request(request: &PublishRequest) -> Result<(), PublishError> {
    let invalid = |msg: String| Err(PublishError::InvalidRequest(msg));

    if request.self_id.trim().is_empty() {
        return invalid("self_id is empty".into());
    }
    if request.name.trim().is_empty() {
        return invalid("name is empty".into());
    }
    if let Some(draft) = request.ideas.iter().find(|d| d.idea_id.trim().is_empty()) {
        return invalid(format!("idea with empty idea_id (tx_id {:?})", draft.tx_id));
    }

    // Same structural rules the verifier applies, with placeholder tx ids
    // for ideas that are not uploaded yet.
    let provisional = SelfSnapshot {
        self_id: request.self_id.clone(),
        parent_snapshot_tx: None,
        ideas: request
            .ideas
            .iter()
            .map(|d| IdeaRef {
                idea_id: d.idea_id.clone(),
                tx_id: d.tx_id.clone().unwrap_or_else(|| PENDING_TX.to_string()),
            })
            .collect(),
        edges: request.edges.clone(),
        notes: None,
        created_at: None,
    };
    let document = provisional.to_document().map_err(|source| PublishError::Encode {
        entity: Entity::SelfSnapshot,
        source,
    })?;
    let check = check_snapshot(&document, EdgePolicy::Strict);
    if !check.is_valid() {
        let reasons: Vec<String> = check.errors.iter().map(ToString::to_string).collect();
        return invalid(reasons.join("; "));
    }
    Ok(())
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use afterlife_core::EdgeType;
    use serde_json::json;

    fn request() -> PublishRequest {
        PublishRequest {
            self_id: "self-1".into(),
            name: "Ada".into(),
            description: None,
            ideas: vec![IdeaDraft::new("i1"), IdeaDraft::existing("i2", "tx-i2")],
            edges: vec![IdeaEdge {
                from_idea_id: "i1".into(),
                to_idea_id: "i2".into(),
                edge_type: EdgeType::Refines,
            }],
            notes: None,
            parent: ParentLink::None,
            fork_of: None,
            links: None,
            owner_address: None,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        validate_request(&request()).unwrap();
    }

    #[test]
    fn rejects_duplicate_ideas_and_dangling_edges() {
        let mut dup = request();
        dup.ideas.push(IdeaDraft::new("i1"));
        assert!(matches!(validate_request(&dup), Err(PublishError::InvalidRequest(_))));

        let mut dangling = request();
        dangling.edges[0].to_idea_id = "ghost".into();
        assert!(matches!(validate_request(&dangling), Err(PublishError::InvalidRequest(_))));

        let mut empty = request();
        empty.ideas.clear();
        assert!(validate_request(&empty).is_err());
    }

    #[test]
    fn request_reads_from_json() {
        let request: PublishRequest = serde_json::from_value(json!({
            "self_id": "s",
            "name": "n",
            "parent": {"mode": "auto"},
            "ideas": [
                {"idea_id": "i1", "title": "First", "body": {"text": "hi"}},
                {"idea_id": "i2", "tx_id": "abc"}
            ],
            "edges": [{"from_idea_id": "i1", "to_idea_id": "i2", "type": "depends-on"}]
        }))
        .unwrap();
        assert_eq!(request.parent, ParentLink::AutoDiscover);
        assert_eq!(request.ideas[0].fields["title"], "First");
        assert_eq!(request.ideas[1].tx_id.as_deref(), Some("abc"));
        assert_eq!(request.edges[0].edge_type, EdgeType::DependsOn);

        let explicit: ParentLink = serde_json::from_value(json!({"mode": "explicit", "tx": "p"})).unwrap();
        assert_eq!(explicit, ParentLink::Explicit { tx: "p".into() });
    }
}
