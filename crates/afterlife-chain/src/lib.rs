//! Afterlife chain operations
//!
//! Multi-document flows built on the core data model and the network clients:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      AFTERLIFE CHAIN                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │   ChainVerifier   Head ──► Snapshot ──► Idea, Idea, ...             │
//! │                   (ChainReport, never fails)                        │
//! │                                                                     │
//! │   Publisher       Idea, Idea, ... ──► Snapshot ──► Head             │
//! │                   (+ optional convergence poll)                     │
//! │                                                                     │
//! │   history         head versions, snapshot parent lineage            │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod history;
pub mod publish;
pub mod report;
pub mod verify;

pub use history::{head_history, snapshot_lineage, HeadVersion, Lineage, LineageEntry, LineageStop};
pub use publish::{
    Convergence, IdeaDraft, ParentLink, PublishError, PublishOutcome, PublishRequest,
    PublishedIdea, Publisher,
};
pub use report::{ChainDocument, ChainReport, DocumentReport, Finding, Findings, IdeaReport, Stage};
pub use verify::ChainVerifier;
