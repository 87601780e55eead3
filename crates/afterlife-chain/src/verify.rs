//! Chain Verifier: walks Head -> Snapshot -> Ideas.
//!
//! ```text
//!   ResolveHead ──► ValidateHead ──► ValidateSnapshot ──► ValidateIdeas
//!       │                │                  │                  │
//!    no head       no snapshot_tx      no payload         per-idea report
//!   (terminal)       (terminal)        (terminal)        (never terminal)
//! ```
//!
//! Every stage appends to one [`ChainReport`]; errors in a stage only stop
//! the walk when the next link cannot be located at all. Verification never
//! returns `Err`.

use crate::report::{ChainDocument, ChainReport, DocumentReport, Findings, IdeaReport, Stage};
use afterlife_client::{DocumentFetchClient, FetchHints, FetchedDocument, Integrity, LedgerQueryClient};
use afterlife_core::namespace::{check_namespace, NamespaceIssue, IDENTITY_TAG, TAG_ENTITY, TAG_IDEA_ID};
use afterlife_core::schema::{check_snapshot, head_snapshot_tx, parse_head, parse_idea};
use afterlife_core::{EdgePolicy, Entity, IdeaRef, SelfHead, SnapshotCheck, TagIndex, TxRecord};
use serde_json::Value;

pub struct ChainVerifier {
    query: LedgerQueryClient,
    fetch: DocumentFetchClient,
}

impl ChainVerifier {
    pub fn new(query: LedgerQueryClient, fetch: DocumentFetchClient) -> Self {
        Self { query, fetch }
    }

    /// Verify the full chain of the Self identified by `self_id`.
    pub async fn verify_self(&self, self_id: &str) -> ChainReport {
        let mut report = ChainReport::new(self_id);

        // ------------------------------------------------------------------
        // ResolveHead
        // ------------------------------------------------------------------
        tracing::info!(self_id, "resolving head");
        let head_record = match self.query.latest_head(self_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.error(
                    Stage::ResolveHead,
                    None,
                    format!("no discoverable head for self {self_id}"),
                );
                return report.finish();
            }
            Err(e) => {
                report.error(Stage::ResolveHead, None, format!("head lookup failed: {e}"));
                return report.finish();
            }
        };

        // ------------------------------------------------------------------
        // ValidateHead
        // ------------------------------------------------------------------
        let head_tx = head_record.id.clone();
        tracing::info!(self_id, head_tx = %head_tx, "validating head");
        let mut head_doc = ChainDocument::<SelfHead>::new(&head_tx);
        let mut findings = Findings::default();
        check_record(&head_record, Entity::SelfHead, &mut findings);

        let fetched = self.fetch_json(&head_record, &mut findings).await;
        let snapshot_tx = match &fetched {
            Some((value, doc)) => {
                head_doc.integrity = Some(doc.integrity.clone());
                head_doc.document = self.validate_head(value, &head_record, self_id, &mut findings).await;
                head_snapshot_tx(value).map(str::to_string)
            }
            None => None,
        };
        head_doc.record = Some(head_record);
        report.head = Some(head_doc);
        report.absorb(Stage::ValidateHead, &head_tx, findings);

        let Some(snapshot_tx) = snapshot_tx else {
            report.error(
                Stage::ValidateHead,
                Some(&head_tx),
                "snapshot_tx cannot be extracted from head; chain walk stopped",
            );
            return report.finish();
        };

        // ------------------------------------------------------------------
        // ValidateSnapshot
        // ------------------------------------------------------------------
        tracing::info!(self_id, snapshot_tx = %snapshot_tx, "validating snapshot");
        let mut snapshot_doc = ChainDocument::new(&snapshot_tx);
        let mut findings = Findings::default();
        let record = self.locate(&snapshot_tx, Entity::SelfSnapshot, &mut findings).await;
        if let Some(record) = &record {
            if record.tag_index().first(IDENTITY_TAG).is_some_and(|v| v != self_id) {
                findings.error(format!("{IDENTITY_TAG} tag does not match head self_id {self_id}"));
            }
        }
        let hints = hints_for(record.as_ref());
        let check = match self.fetch.fetch_json(&snapshot_tx, &hints).await {
            Ok((value, doc)) => {
                note_integrity(&doc.integrity, &mut findings);
                snapshot_doc.integrity = Some(doc.integrity);
                Some(self.validate_snapshot(&value, self_id, &mut findings).await)
            }
            Err(e) => {
                findings.error(format!("snapshot payload unavailable: {e}"));
                None
            }
        };
        snapshot_doc.record = record;
        if let Some(check) = &check {
            snapshot_doc.document = check.clone().into_snapshot().ok();
        }
        report.snapshot = Some(snapshot_doc);
        report.absorb(Stage::ValidateSnapshot, &snapshot_tx, findings);

        let Some(check) = check else {
            return report.finish();
        };

        // ------------------------------------------------------------------
        // ValidateIdeas
        // ------------------------------------------------------------------
        tracing::info!(self_id, ideas = check.ideas.len(), "validating ideas");
        for idea_ref in &check.ideas {
            let idea_report = self.verify_idea(idea_ref).await;
            for message in &idea_report.errors {
                report.error(Stage::ValidateIdeas, Some(&idea_report.tx_id), message.clone());
            }
            for message in &idea_report.warnings {
                report.warn(Stage::ValidateIdeas, Some(&idea_report.tx_id), message.clone());
            }
            report.ideas.push(idea_report);
        }

        let report = report.finish();
        tracing::info!(self_id, ok = report.ok, errors = report.errors.len(), "chain verified");
        report
    }

    /// Check one declared idea. Failures stay inside the returned report.
    pub async fn verify_idea(&self, idea_ref: &IdeaRef) -> IdeaReport {
        let mut findings = Findings::default();
        let mut integrity = None;

        let record = self.locate(&idea_ref.tx_id, Entity::Idea, &mut findings).await;
        if let Some(tagged) = record.as_ref().and_then(|r| r.tag_index().first(TAG_IDEA_ID).map(str::to_string)) {
            if tagged != idea_ref.idea_id {
                findings.error(format!(
                    "{TAG_IDEA_ID} tag is {tagged:?}, snapshot declares {:?}",
                    idea_ref.idea_id
                ));
            }
        }

        match self.fetch.fetch_json(&idea_ref.tx_id, &hints_for(record.as_ref())).await {
            Ok((value, doc)) => {
                note_integrity(&doc.integrity, &mut findings);
                integrity = Some(doc.integrity);
                check_idea(&value, Some(idea_ref.idea_id.as_str()), &mut findings);
            }
            Err(e) => findings.error(format!("idea payload unavailable: {e}")),
        }

        IdeaReport {
            idea_id: idea_ref.idea_id.clone(),
            tx_id: idea_ref.tx_id.clone(),
            ok: findings.is_clean(),
            errors: findings.errors,
            warnings: findings.warnings,
            integrity,
        }
    }

    /// Check a single transaction, dispatching on its `Entity` tag.
    pub async fn verify_tx(&self, tx_id: &str) -> DocumentReport {
        let mut report = DocumentReport::new(tx_id);
        let mut findings = Findings::default();

        let record = match self.query.find_by_id(tx_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                findings.error("transaction is not discoverable by id");
                return report.finish(findings);
            }
            Err(e) => {
                findings.error(format!("transaction lookup failed: {e}"));
                return report.finish(findings);
            }
        };

        let index = record.tag_index();
        let entity = index.first(TAG_ENTITY).and_then(Entity::parse);
        report.entity = entity;
        match entity {
            Some(entity) => check_record(&record, entity, &mut findings),
            None => {
                findings.warn(format!(
                    "unknown entity {:?}; only namespace tags checked",
                    index.first(TAG_ENTITY).unwrap_or("")
                ));
                for issue in check_namespace(&index, None) {
                    if !is_entity_issue(&issue) {
                        findings.error(issue.to_string());
                    }
                }
                unconfirmed_warning(&record, &mut findings);
            }
        }

        if let Some((value, doc)) = self.fetch_json(&record, &mut findings).await {
            report.integrity = Some(doc.integrity.clone());
            match entity {
                Some(Entity::SelfHead) => {
                    let self_id = index.first(IDENTITY_TAG).unwrap_or_default().to_string();
                    self.validate_head(&value, &record, &self_id, &mut findings).await;
                }
                Some(Entity::SelfSnapshot) => {
                    let self_id = index.first(IDENTITY_TAG).unwrap_or_default().to_string();
                    self.validate_snapshot(&value, &self_id, &mut findings).await;
                }
                Some(Entity::Idea) => {
                    check_idea(&value, index.first(TAG_IDEA_ID), &mut findings);
                }
                None => {}
            }
        }

        report.record = Some(record);
        report.finish(findings)
    }

    // ======================================================================
    // Per-entity checks
    // ======================================================================

    async fn validate_head(
        &self,
        value: &Value,
        record: &TxRecord,
        self_id: &str,
        findings: &mut Findings,
    ) -> Option<SelfHead> {
        let head = match parse_head(value) {
            Ok(head) => head,
            Err(e) => {
                findings.error(format!("invalid head: {e}"));
                return None;
            }
        };

        if head.self_id != self_id {
            findings.error(format!(
                "head self_id {:?} does not match {IDENTITY_TAG} {self_id:?}",
                head.self_id
            ));
        }
        if let Some(owner) = &head.owner_address {
            if !record.owner_address.is_empty() && owner != &record.owner_address {
                findings.warn(format!(
                    "head owner_address {owner} differs from transaction owner {}",
                    record.owner_address
                ));
            }
        }
        if let Some(fork) = &head.fork_of {
            if !self.is_discoverable(&fork.source_head_tx).await {
                findings.warn(format!(
                    "fork_of.source_head_tx {} is not discoverable",
                    fork.source_head_tx
                ));
            }
        }
        Some(head)
    }

    async fn validate_snapshot(&self, value: &Value, self_id: &str, findings: &mut Findings) -> SnapshotCheck {
        let check = check_snapshot(value, EdgePolicy::Strict);
        for error in &check.errors {
            findings.error(format!("invalid snapshot: {error}"));
        }
        if let Some(declared) = &check.self_id {
            if declared != self_id {
                findings.error(format!(
                    "snapshot self_id {declared:?} does not match head self_id {self_id:?}"
                ));
            }
        }
        if let Some(parent) = &check.parent_snapshot_tx {
            if !self.is_discoverable(parent).await {
                findings.warn(format!("parent_snapshot_tx {parent} is not discoverable"));
            }
        }
        check
    }

    // ======================================================================
    // Ledger helpers
    // ======================================================================

    /// Id lookup plus tag checks. A missing record is an error but the
    /// payload is still fetched by id.
    async fn locate(&self, tx_id: &str, entity: Entity, findings: &mut Findings) -> Option<TxRecord> {
        match self.query.find_by_id(tx_id).await {
            Ok(Some(record)) => {
                check_record(&record, entity, findings);
                Some(record)
            }
            Ok(None) => {
                findings.error(format!("{entity} transaction is not discoverable by id"));
                None
            }
            Err(e) => {
                findings.error(format!("{entity} lookup failed: {e}"));
                None
            }
        }
    }

    async fn fetch_json(
        &self,
        record: &TxRecord,
        findings: &mut Findings,
    ) -> Option<(Value, FetchedDocument)> {
        match self.fetch.fetch_json(&record.id, &hints_for(Some(record))).await {
            Ok((value, doc)) => {
                note_integrity(&doc.integrity, findings);
                Some((value, doc))
            }
            Err(e) => {
                findings.error(format!("payload unavailable: {e}"));
                None
            }
        }
    }

    async fn is_discoverable(&self, tx_id: &str) -> bool {
        matches!(self.query.find_by_id(tx_id).await, Ok(Some(_)))
    }
}

fn hints_for(record: Option<&TxRecord>) -> FetchHints {
    record
        .map(|r| FetchHints::from_tags(&r.tags))
        .unwrap_or_default()
}

fn check_record(record: &TxRecord, entity: Entity, findings: &mut Findings) {
    let index: TagIndex = record.tag_index();
    for issue in check_namespace(&index, Some(entity)) {
        findings.error(issue.to_string());
    }
    unconfirmed_warning(record, findings);
}

fn unconfirmed_warning(record: &TxRecord, findings: &mut Findings) {
    if !record.is_confirmed() {
        findings.warn("transaction is not confirmed in a block yet");
    }
}

fn note_integrity(integrity: &Integrity, findings: &mut Findings) {
    match integrity {
        Integrity::Verified { .. } => {}
        Integrity::NotApplicable => findings.warn("no content hash available; integrity not checked"),
        Integrity::Mismatch { expected, actual } => {
            findings.error(format!("content hash mismatch: expected {expected}, got {actual}"))
        }
    }
}

fn check_idea(value: &Value, expected_id: Option<&str>, findings: &mut Findings) {
    match parse_idea(value) {
        Ok(idea) => {
            if !idea.schema_matches() {
                findings.warn(format!(
                    "idea schema is {:?}, expected {}",
                    idea.schema,
                    Entity::Idea.schema()
                ));
            }
            if let Some(expected) = expected_id {
                if idea.idea_id != expected {
                    findings.error(format!(
                        "idea_id {:?} does not match declared {expected:?}",
                        idea.idea_id
                    ));
                }
            }
        }
        Err(e) => findings.error(format!("invalid idea: {e}")),
    }
}

fn is_entity_issue(issue: &NamespaceIssue) -> bool {
    match issue {
        NamespaceIssue::Missing { name } | NamespaceIssue::Mismatch { name, .. } => name == TAG_ENTITY,
    }
}
