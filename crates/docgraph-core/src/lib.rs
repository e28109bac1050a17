//! docgraph paginated knowledge-graph storage
//!
//! Entities and relations are stored as individual documents, scoped by an
//! opaque user id, so reads can be partial and neighbourhoods can be walked
//! a level at a time:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          GraphStorage                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────┐   cascade   ┌───────────────┐                      │
//! │  │ EntityStore │────────────►│ RelationStore │                      │
//! │  └──────┬──────┘             └───────┬───────┘                      │
//! │         │  schedule(user)            │                              │
//! │         └──────────┬─────────────────┘                              │
//! │                    ▼                                                │
//! │           ┌─────────────────┐  refresh   ┌──────────────┐           │
//! │           │ SummaryWorker   │───────────►│ SummaryIndex │           │
//! │           │ (bounded queue) │            └──────────────┘           │
//! │           └─────────────────┘                                       │
//! │                                                                     │
//! │  GraphTraversal ── AdjacencySource (EntityStore + RelationStore)    │
//! │                                                                     │
//! └───────────────────────────────┬─────────────────────────────────────┘
//!                                 ▼
//!                 ConnectionGate ─► dyn DocumentStore
//! ```
//!
//! ## Guarantees
//!
//! - **User isolation**: every query carries the `userId` filter.
//! - **No transactions**: an entity delete and its relation cascade are two
//!   writes; a failed cascade is reported, the entity stays deleted.
//! - **Eventually consistent summaries**: writes never wait for the summary
//!   index; a stale or missing summary is recomputed on read.
//! - **Bounded traversal**: cycle-safe BFS with a depth limit, a timeout and
//!   cancellation.

pub mod config;
pub mod entities;
pub mod error;
pub mod facade;
pub mod model;
pub mod relations;
pub mod summary;
pub mod traversal;


pub use config::{
    ConnectionConfig, GraphStoreConfig, SearchConfig, SummaryConfig, TraversalConfig,
};
pub use entities::EntityStore;
pub use error::{GraphError, Result};
pub use facade::{GraphStorage, UserGraphStorage};
pub use model::{
    relation_id, Entity, EntityMetadata, GraphSummary, KnowledgeGraph, RecentEntity, Relation,
    RelationMetadata, SearchIndex,
};
pub use relations::RelationStore;
pub use summary::{SummaryIndex, SummaryRefresher, SummaryWorker};
pub use traversal::{AdjacencySource, GraphTraversal};

/// Collection names in the document store.
pub mod collections {
    pub const ENTITIES: &str = "entities";
    pub const RELATIONS: &str = "relations";
    pub const SUMMARIES: &str = "summaries";
}
