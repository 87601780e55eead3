//! Ledger transaction records as returned by the query service.

use crate::tags::{Tag, TagIndex};
use serde::{Deserialize, Serialize};

/// One transaction node from a ledger query.
///
/// `block_height == None` means the transaction is not confirmed yet; it sorts
/// below every confirmed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub id: String,
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl TxRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_address: String::new(),
            block_height: None,
            block_timestamp: None,
            tags: Vec::new(),
        }
    }

    pub fn with_height(mut self, height: u64) -> Self {
        self.block_height = Some(height);
        self
    }

    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    pub fn tag_index(&self) -> TagIndex {
        TagIndex::build(&self.tags)
    }

    /// Height used for ordering. `None` (unconfirmed) ranks below every
    /// confirmed height, including 0.
    pub fn sort_height(&self) -> Option<u64> {
        self.block_height
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_height.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfirmed_sorts_below_genesis() {
        let pending = TxRecord::new("a");
        let genesis = TxRecord::new("b").with_height(0);
        assert!(pending.sort_height() < genesis.sort_height());
        assert!(!pending.is_confirmed());
    }

    #[test]
    fn heights_above_i64_range_keep_their_order() {
        let top = TxRecord::new("top").with_height(u64::MAX);
        let low = TxRecord::new("low").with_height(0);
        assert!(top.sort_height() > low.sort_height());
        assert!(top.sort_height() > TxRecord::new("pending").sort_height());
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let rec: TxRecord = serde_json::from_str(r#"{"id":"tx1"}"#).unwrap();
        assert_eq!(rec.id, "tx1");
        assert!(rec.tags.is_empty());
        assert_eq!(rec.block_height, None);
    }
}
