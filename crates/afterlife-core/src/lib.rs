//! Afterlife core data model
//!
//! Everything in this crate is pure: no network, no clock, no filesystem.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         AFTERLIFE CORE                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │   TxRecord ──► TagIndex ──► namespace checks                         │
//! │       │                                                              │
//! │       ▼                                                              │
//! │   resolver (latest per identity)                                     │
//! │                                                                      │
//! │   JSON payload ──► schema validators ──► SelfHead / SelfSnapshot /   │
//! │                                          Idea                        │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entity chain
//!
//! - **SelfHead** points at the current snapshot (`snapshot_tx`)
//! - **SelfSnapshot** lists idea references and typed edges between them
//! - **Idea** is a loosely-typed JSON document addressed by tx id

pub mod digest;
pub mod namespace;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod tags;

pub use namespace::{Entity, NamespaceIssue};
pub use record::TxRecord;
pub use resolver::{latest_for, latest_per_identity, versions_for};
pub use schema::{
    EdgePolicy, EdgeType, ForkOf, Idea, IdeaEdge, IdeaRef, SchemaError, SelfHead, SelfSnapshot,
    SnapshotCheck,
};
pub use tags::{Tag, TagIndex};
