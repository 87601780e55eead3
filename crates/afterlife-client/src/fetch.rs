//! Document Fetch Client: payload bytes from redundant content gateways.
//!
//! Only transport failures fall back to the next gateway. Once a gateway has
//! answered with bytes, decoding, hashing and JSON parsing are judged once:
//! a parse failure is final and is not retried elsewhere.

use crate::config::ClientConfig;
use crate::encoding::ContentEncoding;
use crate::retry::{AttemptError, FallbackError, RetryPolicy};
use crate::transport::GatewayTransport;
use afterlife_core::digest::{digests_match, sha256_hex};
use afterlife_core::namespace::{TAG_CONTENT_SHA256, TAG_ORIGINAL_SHA256};
use afterlife_core::{Tag, TagIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// What the caller already knows about the transaction.
#[derive(Debug, Clone, Default)]
pub struct FetchHints {
    /// Tags from the ledger query; select decoder and expected hash.
    pub tags: Vec<Tag>,
    /// Takes priority over any hash tag.
    pub expected_sha256: Option<String>,
}

impl FetchHints {
    pub fn from_tags(tags: &[Tag]) -> Self {
        Self {
            tags: tags.to_vec(),
            expected_sha256: None,
        }
    }

    pub fn with_expected_sha256(mut self, hash: impl Into<String>) -> Self {
        self.expected_sha256 = Some(hash.into());
        self
    }

    fn expected_hash(&self, index: &TagIndex) -> Option<String> {
        self.expected_sha256
            .as_deref()
            .or_else(|| index.first(TAG_ORIGINAL_SHA256))
            .or_else(|| index.first(TAG_CONTENT_SHA256))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Integrity {
    /// No expected hash was available.
    NotApplicable,
    Verified { sha256: String },
    Mismatch { expected: String, actual: String },
}

impl Integrity {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Integrity::Mismatch { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub tx_id: String,
    /// Gateway that served the bytes.
    pub gateway: String,
    pub content_type: Option<String>,
    pub encoding: ContentEncoding,
    /// Decoded payload.
    pub bytes: Vec<u8>,
    pub sha256: String,
    pub integrity: Integrity,
}

impl FetchedDocument {
    pub fn json(&self) -> Result<Value, FetchError> {
        serde_json::from_slice(&self.bytes).map_err(|e| FetchError::Parse {
            tx_id: self.tx_id.clone(),
            gateway: self.gateway.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("no gateways configured")]
    NoGateways,
    #[error("fetching {tx_id} failed after {attempts} gateways; last ({gateway}): {last}")]
    Exhausted {
        tx_id: String,
        attempts: usize,
        gateway: String,
        last: AttemptError,
    },
    #[error("cannot decode {encoding} payload of {tx_id}: {reason}")]
    Decode {
        tx_id: String,
        encoding: &'static str,
        reason: String,
    },
    #[error("payload of {tx_id} from {gateway} is not valid JSON: {reason}")]
    Parse {
        tx_id: String,
        gateway: String,
        reason: String,
    },
}

impl FetchError {
    fn from_fallback(tx_id: &str, err: FallbackError) -> Self {
        match err {
            FallbackError::NoTargets => FetchError::NoGateways,
            FallbackError::Exhausted {
                attempts,
                target,
                last,
            } => FetchError::Exhausted {
                tx_id: tx_id.to_string(),
                attempts,
                gateway: target,
                last,
            },
        }
    }
}

#[derive(Clone)]
pub struct DocumentFetchClient {
    transport: Arc<dyn GatewayTransport>,
    gateways: Vec<String>,
    policy: RetryPolicy,
}

impl DocumentFetchClient {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        gateways: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            gateways,
            policy,
        }
    }

    pub fn from_config(transport: Arc<dyn GatewayTransport>, config: &ClientConfig) -> Self {
        Self::new(transport, config.gateways.clone(), config.retry_policy())
    }

    pub fn gateways(&self) -> &[String] {
        &self.gateways
    }

    pub async fn fetch(&self, tx_id: &str, hints: &FetchHints) -> Result<FetchedDocument, FetchError> {
        let transport = &self.transport;
        let attempted = self
            .policy
            .run(&self.gateways, |gateway| async move {
                transport.get(&gateway, tx_id).await
            })
            .await
            .map_err(|e| FetchError::from_fallback(tx_id, e))?;

        let index = TagIndex::build(&hints.tags);
        let encoding = ContentEncoding::from_tags(&index);
        let bytes = encoding
            .decode(&attempted.value.bytes)
            .map_err(|e| FetchError::Decode {
                tx_id: tx_id.to_string(),
                encoding: encoding.as_str(),
                reason: e.to_string(),
            })?;

        let sha256 = sha256_hex(&bytes);
        let integrity = match hints.expected_hash(&index) {
            None => Integrity::NotApplicable,
            Some(expected) if digests_match(&expected, &sha256) => Integrity::Verified {
                sha256: sha256.clone(),
            },
            Some(expected) => Integrity::Mismatch {
                expected,
                actual: sha256.clone(),
            },
        };
        if integrity.is_mismatch() {
            tracing::warn!(tx_id, gateway = %attempted.target, "payload hash mismatch");
        }

        Ok(FetchedDocument {
            tx_id: tx_id.to_string(),
            gateway: attempted.target,
            content_type: attempted.value.content_type,
            encoding,
            bytes,
            sha256,
            integrity,
        })
    }

    /// Fetch and parse as JSON. A parse failure is final.
    pub async fn fetch_json(
        &self,
        tx_id: &str,
        hints: &FetchHints,
    ) -> Result<(Value, FetchedDocument), FetchError> {
        let document = self.fetch(tx_id, hints).await?;
        let value = document.json()?;
        Ok((value, document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_hash_beats_tags() {
        let tags = vec![
            Tag::new(TAG_CONTENT_SHA256, "content"),
            Tag::new(TAG_ORIGINAL_SHA256, "original"),
        ];
        let index = TagIndex::build(&tags);
        let hints = FetchHints::from_tags(&tags);
        assert_eq!(hints.expected_hash(&index).as_deref(), Some("original"));
        let hints = hints.with_expected_sha256("caller");
        assert_eq!(hints.expected_hash(&index).as_deref(), Some("caller"));

        let only_content = vec![Tag::new(TAG_CONTENT_SHA256, "content")];
        let hints = FetchHints::from_tags(&only_content);
        assert_eq!(
            hints.expected_hash(&TagIndex::build(&only_content)).as_deref(),
            Some("content")
        );
    }

    #[test]
    fn integrity_serializes_with_status() {
        let value = serde_json::to_value(Integrity::NotApplicable).unwrap();
        assert_eq!(value, serde_json::json!({"status": "not_applicable"}));
    }
}
