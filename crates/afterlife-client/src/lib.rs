//! Afterlife network clients
//!
//! Two redundant read paths and one write seam:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                    AFTERLIFE CLIENT                                │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  LedgerQueryClient ──► RetryPolicy ──► QueryTransport   (GraphQL)  │
//! │                          │  endpoint 1, endpoint 2, ...            │
//! │                          ▼                                         │
//! │  DocumentFetchClient ─► RetryPolicy ──► GatewayTransport (GET)     │
//! │        │                                                           │
//! │        └── decode (gzip / brotli) ──► SHA-256 integrity            │
//! │                                                                    │
//! │  UploadService (trait only; MemoryLedger implements it)            │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Endpoints are tried strictly in order with a fixed delay between failed
//! attempts. Nothing is cached: every call is a fresh round trip.

pub mod config;
pub mod encoding;
pub mod fetch;
pub mod http;
pub mod memory;
pub mod query;
pub mod retry;
pub mod transport;

pub use config::{ClientConfig, ConfigError, Preferences};
pub use encoding::ContentEncoding;
pub use fetch::{DocumentFetchClient, FetchError, FetchHints, FetchedDocument, Integrity};
pub use http::HttpTransport;
pub use memory::{LedgerCall, MemoryLedger, TargetBehavior};
pub use query::{LedgerQueryClient, QueryError, QueryPage, TagFilter, TxQuery};
pub use retry::{AttemptError, Attempted, FallbackError, RetryPolicy};
pub use transport::{GatewayResponse, GatewayTransport, QueryTransport, UploadError, UploadService};
