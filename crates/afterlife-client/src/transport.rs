//! Transport seams for the external collaborators.
//!
//! The clients never talk HTTP directly; they go through these traits so the
//! same fallback and validation logic runs against [`crate::HttpTransport`]
//! in production and [`crate::MemoryLedger`] in tests and offline mode.

use crate::retry::AttemptError;
use afterlife_core::Tag;
use async_trait::async_trait;
use serde_json::Value;

/// Raw bytes returned by a content gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The ledger query service (GraphQL over HTTP).
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// POST a GraphQL request body to one endpoint and return the decoded JSON
    /// response, whatever its contents.
    async fn post_graphql(&self, endpoint: &str, body: &Value) -> Result<Value, AttemptError>;
}

/// A content gateway serving `GET <base>/<tx_id>`.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn get(&self, gateway: &str, tx_id: &str) -> Result<GatewayResponse, AttemptError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("upload transport error: {0}")]
    Transport(String),
}

/// Writes a document to the ledger and returns its transaction id.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        tags: &[Tag],
    ) -> Result<String, UploadError>;
}
