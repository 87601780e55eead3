//! The fixed tag namespace that makes Afterlife documents discoverable.
//!
//! A transaction is discoverable when it carries all three namespace pairs
//! (`App-Name`, `App-Tag`, `Schema-Version`) with their literal values, an
//! `Entity` tag naming its document kind, and the `Self-Id` identity tag.

use crate::tags::{Tag, TagIndex};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TAG_APP_NAME: &str = "App-Name";
pub const TAG_APP_TAG: &str = "App-Tag";
pub const TAG_SCHEMA_VERSION: &str = "Schema-Version";
pub const TAG_ENTITY: &str = "Entity";
pub const TAG_SELF_ID: &str = "Self-Id";
pub const TAG_IDEA_ID: &str = "Idea-Id";
pub const TAG_CONTENT_TYPE: &str = "Content-Type";
pub const TAG_CONTENT_ENCODING: &str = "Content-Encoding";
pub const TAG_STORED_ENCODING: &str = "Stored-Encoding";
pub const TAG_ORIGINAL_SHA256: &str = "Original-SHA256";
pub const TAG_CONTENT_SHA256: &str = "Content-SHA256";

pub const APP_NAME: &str = "Afterlife";
pub const APP_TAG: &str = "afterlife-protocol";
pub const SCHEMA_VERSION: &str = "1";

/// The identity tag used to group historical versions of one Self.
pub const IDENTITY_TAG: &str = TAG_SELF_ID;

/// `(name, value)` pairs every Afterlife transaction must carry.
pub const NAMESPACE_TAGS: [(&str, &str); 3] = [
    (TAG_APP_NAME, APP_NAME),
    (TAG_APP_TAG, APP_TAG),
    (TAG_SCHEMA_VERSION, SCHEMA_VERSION),
];

/// Document kinds declared by the `Entity` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    SelfHead,
    SelfSnapshot,
    Idea,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Entity::SelfHead => "SelfHead",
            Entity::SelfSnapshot => "SelfSnapshot",
            Entity::Idea => "Idea",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SelfHead" => Some(Entity::SelfHead),
            "SelfSnapshot" => Some(Entity::SelfSnapshot),
            "Idea" => Some(Entity::Idea),
            _ => None,
        }
    }

    /// Schema discriminator expected inside the JSON payload.
    pub fn schema(self) -> &'static str {
        match self {
            Entity::SelfHead => crate::schema::SCHEMA_SELFHEAD,
            Entity::SelfSnapshot => crate::schema::SCHEMA_SNAPSHOT,
            Entity::Idea => crate::schema::SCHEMA_IDEA,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discoverability problem found on a transaction's tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceIssue {
    #[error("missing tag {name}")]
    Missing { name: String },
    #[error("tag {name} is {found:?}, expected {expected:?}")]
    Mismatch {
        name: String,
        expected: String,
        found: String,
    },
}

/// Check the namespace pairs, the `Entity` tag and the identity tag.
///
/// `expected` narrows the `Entity` check; `None` only requires the tag to name
/// a known entity.
pub fn check_namespace(index: &TagIndex, expected: Option<Entity>) -> Vec<NamespaceIssue> {
    let mut issues = Vec::new();

    for (name, value) in NAMESPACE_TAGS {
        match index.first(name) {
            None => issues.push(NamespaceIssue::Missing {
                name: name.to_string(),
            }),
            Some(found) if !index.contains(name, value) => {
                issues.push(NamespaceIssue::Mismatch {
                    name: name.to_string(),
                    expected: value.to_string(),
                    found: found.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    match (index.first(TAG_ENTITY), expected) {
        (None, _) => issues.push(NamespaceIssue::Missing {
            name: TAG_ENTITY.to_string(),
        }),
        (Some(found), Some(entity)) if found != entity.as_str() => {
            issues.push(NamespaceIssue::Mismatch {
                name: TAG_ENTITY.to_string(),
                expected: entity.as_str().to_string(),
                found: found.to_string(),
            })
        }
        _ => {}
    }

    if index.first(IDENTITY_TAG).map_or(true, str::is_empty) {
        issues.push(NamespaceIssue::Missing {
            name: IDENTITY_TAG.to_string(),
        });
    }

    issues
}

/// Tags an upload needs to be discoverable as `entity` under `self_id`.
pub fn discovery_tags(entity: Entity, self_id: &str) -> Vec<Tag> {
    let mut tags: Vec<Tag> = NAMESPACE_TAGS
        .iter()
        .map(|(name, value)| Tag::new(*name, *value))
        .collect();
    tags.push(Tag::new(TAG_ENTITY, entity.as_str()));
    tags.push(Tag::new(IDENTITY_TAG, self_id));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_tags_pass_the_check() {
        let tags = discovery_tags(Entity::SelfHead, "self-1");
        let index = TagIndex::build(&tags);
        assert!(check_namespace(&index, Some(Entity::SelfHead)).is_empty());
    }

    #[test]
    fn wrong_entity_and_missing_identity_are_reported() {
        let mut tags = discovery_tags(Entity::Idea, "");
        tags.retain(|t| t.name != IDENTITY_TAG);
        let issues = check_namespace(&TagIndex::build(&tags), Some(Entity::SelfSnapshot));
        assert_eq!(issues.len(), 2);
        assert!(issues.contains(&NamespaceIssue::Missing {
            name: IDENTITY_TAG.to_string()
        }));
    }

    #[test]
    fn wrong_app_name_is_a_mismatch() {
        let tags = vec![
            Tag::new(TAG_APP_NAME, "Other"),
            Tag::new(TAG_APP_TAG, APP_TAG),
            Tag::new(TAG_SCHEMA_VERSION, SCHEMA_VERSION),
            Tag::new(TAG_ENTITY, "Idea"),
            Tag::new(TAG_SELF_ID, "s"),
        ];
        let issues = check_namespace(&TagIndex::build(&tags), None);
        assert_eq!(
            issues,
            vec![NamespaceIssue::Mismatch {
                name: TAG_APP_NAME.to_string(),
                expected: APP_NAME.to_string(),
                found: "Other".to_string(),
            }]
        );
    }

    #[test]
    fn entity_round_trips_through_tag_value() {
        for entity in [Entity::SelfHead, Entity::SelfSnapshot, Entity::Idea] {
            assert_eq!(Entity::parse(entity.as_str()), Some(entity));
        }
        assert_eq!(Entity::parse("Unknown"), None);
    }
}
