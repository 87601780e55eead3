//! Ledger tags and the multi-valued tag index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A name/value annotation attached to a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Tag name -> values, in the order the values were first seen.
///
/// Built once from a transaction's tag list and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    values: HashMap<String, Vec<String>>,
}

impl TagIndex {
    pub fn build(tags: &[Tag]) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for tag in tags {
            values
                .entry(tag.name.clone())
                .or_default()
                .push(tag.value.clone());
        }
        Self { values }
    }

    /// Earliest recorded value for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|vals| vals.first())
            .map(String::as_str)
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.all(name).iter().any(|v| v == value)
    }

    /// Number of distinct tag names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<&[Tag]> for TagIndex {
    fn from(tags: &[Tag]) -> Self {
        TagIndex::build(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_returns_earliest_value() {
        let index = TagIndex::build(&[Tag::new("n", "v1"), Tag::new("n", "v2")]);
        assert_eq!(index.first("n"), Some("v1"));
        assert_eq!(index.all("n"), &["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn len_counts_unique_names() {
        let index = TagIndex::build(&[
            Tag::new("a", "1"),
            Tag::new("b", "2"),
            Tag::new("a", "3"),
        ]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn missing_tag_is_absent() {
        let index = TagIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.first("Self-Id"), None);
        assert!(index.all("Self-Id").is_empty());
    }

    #[test]
    fn interleaved_names_keep_per_name_order() {
        let index = TagIndex::build(&[
            Tag::new("x", "1"),
            Tag::new("y", "a"),
            Tag::new("x", "2"),
            Tag::new("y", "b"),
        ]);
        assert_eq!(index.all("x"), &["1".to_string(), "2".to_string()]);
        assert_eq!(index.first("y"), Some("a"));
        assert!(index.contains("y", "b"));
        assert!(!index.contains("y", "c"));
    }
}
