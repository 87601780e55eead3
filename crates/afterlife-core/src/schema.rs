//! Structural validators for the three Afterlife document kinds.
//!
//! Two validation strategies coexist on purpose:
//!
//! - [`parse_head`] short-circuits on the first problem.
//! - [`parse_snapshot`] / [`check_snapshot`] accumulate every problem before
//!   returning.
//!
//! Snapshot edges have two policies. [`EdgePolicy::Lenient`] (used for
//! parsing/rendering) silently drops malformed edges. [`EdgePolicy::Strict`]
//! (used by verification) reports them as errors.
//!
//! Optional decorative fields (`fork_of`, `links`, ...) are kept only when
//! they are present and well-typed; a malformed one is dropped without
//! rejecting the document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

pub const SCHEMA_SELFHEAD: &str = "afterlife.selfhead@1";
pub const SCHEMA_SNAPSHOT: &str = "afterlife.snapshot@1";
pub const SCHEMA_IDEA: &str = "afterlife.idea@1";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("schema is {found:?}, expected {expected:?}")]
    WrongSchema {
        expected: String,
        found: Option<String>,
    },
    #[error("missing or empty required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("snapshot declares no ideas")]
    NoIdeas,
    #[error("ideas[{index}] is malformed: {reason}")]
    MalformedIdeaRef { index: usize, reason: String },
    #[error("duplicate idea_id {0:?}")]
    DuplicateIdeaId(String),
    #[error("edges[{index}] is malformed")]
    MalformedEdge { index: usize },
    #[error("edges[{index}] has unknown type {found:?}")]
    UnknownEdgeType { index: usize, found: String },
    #[error("edges[{index}] references undeclared idea {idea_id:?}")]
    UnknownIdeaReference { index: usize, idea_id: String },
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkOf {
    pub source_self_id: String,
    pub source_head_tx: String,
}

/// Current metadata of a Self, pointing at its latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfHead {
    pub self_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub snapshot_tx: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<ForkOf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, String>>,
}

impl SelfHead {
    pub fn to_document(&self) -> serde_json::Result<Value> {
        with_schema(SCHEMA_SELFHEAD, serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdeaRef {
    pub idea_id: String,
    pub tx_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    Supports,
    Contradicts,
    Refines,
    DependsOn,
    DerivedFrom,
}

impl EdgeType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "supports" => Some(EdgeType::Supports),
            "contradicts" => Some(EdgeType::Contradicts),
            "refines" => Some(EdgeType::Refines),
            "depends-on" => Some(EdgeType::DependsOn),
            "derived-from" => Some(EdgeType::DerivedFrom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Supports => "supports",
            EdgeType::Contradicts => "contradicts",
            EdgeType::Refines => "refines",
            EdgeType::DependsOn => "depends-on",
            EdgeType::DerivedFrom => "derived-from",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaEdge {
    pub from_idea_id: String,
    pub to_idea_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// A set of idea references plus typed relations between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfSnapshot {
    pub self_id: String,
    #[serde(default)]
    pub parent_snapshot_tx: Option<String>,
    pub ideas: Vec<IdeaRef>,
    #[serde(default)]
    pub edges: Vec<IdeaEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl SelfSnapshot {
    pub fn to_document(&self) -> serde_json::Result<Value> {
        with_schema(SCHEMA_SNAPSHOT, serde_json::to_value(self)?)
    }

    pub fn idea(&self, idea_id: &str) -> Option<&IdeaRef> {
        self.ideas.iter().find(|i| i.idea_id == idea_id)
    }
}

/// A loosely-typed idea document. Only `idea_id` is structural; everything
/// else is carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Idea {
    pub idea_id: String,
    pub schema: Option<String>,
    pub fields: Map<String, Value>,
}

impl Idea {
    pub fn new(idea_id: impl Into<String>) -> Self {
        Self {
            idea_id: idea_id.into(),
            schema: Some(SCHEMA_IDEA.to_string()),
            fields: Map::new(),
        }
    }

    pub fn schema_matches(&self) -> bool {
        self.schema.as_deref() == Some(SCHEMA_IDEA)
    }

    pub fn to_document(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert("schema".to_string(), Value::String(SCHEMA_IDEA.to_string()));
        obj.insert("idea_id".to_string(), Value::String(self.idea_id.clone()));
        Value::Object(obj)
    }
}

/// The `schema` discriminator of an arbitrary document, if it has one.
pub fn document_schema(value: &Value) -> Option<&str> {
    value.get("schema").and_then(Value::as_str)
}

// ============================================================================
// Head
// ============================================================================

/// Parse a head document, stopping at the first problem.
pub fn parse_head(value: &Value) -> Result<SelfHead, SchemaError> {
    let obj = as_object(value)?;
    check_schema(obj, SCHEMA_SELFHEAD)?;

    let self_id = required_str(obj, "self_id")?;
    let name = required_str(obj, "name")?;
    let snapshot_tx = required_str(obj, "snapshot_tx")?;

    Ok(SelfHead {
        self_id,
        name,
        description: optional_str(obj, "description"),
        snapshot_tx,
        fork_of: obj.get("fork_of").and_then(parse_fork_of),
        owner_address: optional_str(obj, "owner_address"),
        updated_at: optional_str(obj, "updated_at"),
        links: obj.get("links").and_then(parse_links),
    })
}

/// `snapshot_tx` straight from a raw head payload, independent of the rest of
/// the head's validity.
pub fn head_snapshot_tx(value: &Value) -> Option<&str> {
    value
        .get("snapshot_tx")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn parse_fork_of(value: &Value) -> Option<ForkOf> {
    let obj = value.as_object()?;
    let source_self_id = non_empty_str(obj, "source_self_id")?;
    let source_head_tx = non_empty_str(obj, "source_head_tx")?;
    Some(ForkOf {
        source_self_id,
        source_head_tx,
    })
}

fn parse_links(value: &Value) -> Option<BTreeMap<String, String>> {
    value
        .as_object()?
        .iter()
        .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Drop malformed edges silently.
    Lenient,
    /// Report malformed edges as errors.
    Strict,
}

/// Everything salvageable from a snapshot payload plus every error found.
///
/// `ideas` holds the well-formed, de-duplicated references even when the
/// snapshot as a whole is invalid, so a verifier can keep walking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotCheck {
    pub self_id: Option<String>,
    pub parent_snapshot_tx: Option<String>,
    pub ideas: Vec<IdeaRef>,
    pub edges: Vec<IdeaEdge>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub errors: Vec<SchemaError>,
}

impl SnapshotCheck {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_snapshot(self) -> Result<SelfSnapshot, Vec<SchemaError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        let Some(self_id) = self.self_id else {
            return Err(vec![SchemaError::MissingField("self_id".to_string())]);
        };
        Ok(SelfSnapshot {
            self_id,
            parent_snapshot_tx: self.parent_snapshot_tx,
            ideas: self.ideas,
            edges: self.edges,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

/// Parse a snapshot for rendering: all structural errors are accumulated and
/// malformed edges are dropped.
pub fn parse_snapshot(value: &Value) -> Result<SelfSnapshot, Vec<SchemaError>> {
    check_snapshot(value, EdgePolicy::Lenient).into_snapshot()
}

pub fn check_snapshot(value: &Value, policy: EdgePolicy) -> SnapshotCheck {
    let mut check = SnapshotCheck::default();

    let obj = match as_object(value) {
        Ok(obj) => obj,
        Err(e) => {
            check.errors.push(e);
            return check;
        }
    };

    if let Err(e) = check_schema(obj, SCHEMA_SNAPSHOT) {
        check.errors.push(e);
    }

    match required_str(obj, "self_id") {
        Ok(id) => check.self_id = Some(id),
        Err(e) => check.errors.push(e),
    }

    check.parent_snapshot_tx = non_empty_str(obj, "parent_snapshot_tx");
    check.notes = optional_str(obj, "notes");
    check.created_at = optional_str(obj, "created_at");

    check_ideas(obj, &mut check);
    check_edges(obj, policy, &mut check);

    check
}

fn check_ideas(obj: &Map<String, Value>, check: &mut SnapshotCheck) {
    let entries = match obj.get("ideas") {
        None | Some(Value::Null) => {
            check
                .errors
                .push(SchemaError::MissingField("ideas".to_string()));
            return;
        }
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            check.errors.push(SchemaError::WrongType {
                field: "ideas".to_string(),
                expected: "an array",
            });
            return;
        }
    };

    if entries.is_empty() {
        check.errors.push(SchemaError::NoIdeas);
        return;
    }

    let mut seen = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            check.errors.push(SchemaError::MalformedIdeaRef {
                index,
                reason: "not an object".to_string(),
            });
            continue;
        };
        let Some(idea_id) = non_empty_str(entry, "idea_id") else {
            check.errors.push(SchemaError::MalformedIdeaRef {
                index,
                reason: "missing idea_id".to_string(),
            });
            continue;
        };
        let Some(tx_id) = non_empty_str(entry, "tx_id") else {
            check.errors.push(SchemaError::MalformedIdeaRef {
                index,
                reason: "missing tx_id".to_string(),
            });
            continue;
        };
        if !seen.insert(idea_id.clone()) {
            check.errors.push(SchemaError::DuplicateIdeaId(idea_id));
            continue;
        }
        check.ideas.push(IdeaRef { idea_id, tx_id });
    }
}

fn check_edges(obj: &Map<String, Value>, policy: EdgePolicy, check: &mut SnapshotCheck) {
    let strict = policy == EdgePolicy::Strict;
    let entries = match obj.get("edges") {
        None | Some(Value::Null) => return,
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            if strict {
                check.errors.push(SchemaError::WrongType {
                    field: "edges".to_string(),
                    expected: "an array",
                });
            }
            return;
        }
    };

    let declared: HashSet<&str> = check.ideas.iter().map(|i| i.idea_id.as_str()).collect();
    let mut edges = Vec::new();
    let mut errors = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let shape = entry.as_object().and_then(|e| {
            Some((
                non_empty_str(e, "from_idea_id")?,
                non_empty_str(e, "to_idea_id")?,
                e.get("type")?.as_str()?.to_string(),
            ))
        });
        let Some((from_idea_id, to_idea_id, kind)) = shape else {
            errors.push(SchemaError::MalformedEdge { index });
            continue;
        };
        let Some(edge_type) = EdgeType::parse(&kind) else {
            errors.push(SchemaError::UnknownEdgeType { index, found: kind });
            continue;
        };
        if let Some(unknown) = [&from_idea_id, &to_idea_id]
            .into_iter()
            .find(|id| !declared.contains(id.as_str()))
        {
            errors.push(SchemaError::UnknownIdeaReference {
                index,
                idea_id: unknown.clone(),
            });
            continue;
        }
        edges.push(IdeaEdge {
            from_idea_id,
            to_idea_id,
            edge_type,
        });
    }

    check.edges = edges;
    if strict {
        check.errors.extend(errors);
    }
}

// ============================================================================
// Idea
// ============================================================================

/// Parse an idea document. Only `idea_id` is enforced; a foreign or missing
/// schema is left for the caller to judge via [`Idea::schema_matches`].
pub fn parse_idea(value: &Value) -> Result<Idea, SchemaError> {
    let obj = as_object(value)?;
    let idea_id = required_str(obj, "idea_id")?;
    let schema = optional_str(obj, "schema");
    let fields = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "idea_id" && k.as_str() != "schema")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Idea {
        idea_id,
        schema,
        fields,
    })
}

// ============================================================================
// Field helpers
// ============================================================================

fn with_schema(schema: &str, value: Value) -> serde_json::Result<Value> {
    match value {
        Value::Object(mut obj) => {
            obj.insert("schema".to_string(), Value::String(schema.to_string()));
            Ok(Value::Object(obj))
        }
        other => Ok(other),
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, SchemaError> {
    value.as_object().ok_or(SchemaError::NotAnObject)
}

fn check_schema(obj: &Map<String, Value>, expected: &str) -> Result<(), SchemaError> {
    let found = obj.get("schema").and_then(Value::as_str);
    if found == Some(expected) {
        Ok(())
    } else {
        Err(SchemaError::WrongSchema {
            expected: expected.to_string(),
            found: found.map(str::to_string),
        })
    }
}

fn required_str(obj: &Map<String, Value>, field: &str) -> Result<String, SchemaError> {
    non_empty_str(obj, field).ok_or_else(|| SchemaError::MissingField(field.to_string()))
}

fn non_empty_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}
