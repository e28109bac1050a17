//! docgraph document-store capability
//!
//! The graph layer persists everything through the [`DocumentStore`] trait:
//! a small, engine-agnostic set of document operations.
//!
//! ```text
//! ┌──────────────────────┐      ┌────────────────────────┐
//! │   docgraph-core      │─────►│  ConnectionGate        │
//! │ (entities/relations/ │      │  connect once, retry   │
//! │  summaries)          │      └───────────┬────────────┘
//! └──────────────────────┘                  │ Arc<dyn DocumentStore>
//!                              ┌────────────┴────────────┐
//!                              ▼                         ▼
//!                    MemoryDocumentStore      JsonFileDocumentStore
//! ```
//!
//! ## Operations
//!
//! - **Upsert by filter** with optional preserved paths (insert-only fields)
//! - **Find** one, or many with sort and limit
//! - **Delete** one or many
//! - **Distinct** values of a field
//! - **Aggregate** with a typed pipeline of [`Stage`]s
//! - **Text search** with relevance scores, scoped by a filter

pub mod connection;
mod engine;
pub mod error;
pub mod file;
pub mod filter;
pub mod memory;
pub mod text;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use connection::{
    BackendConfig, ConnectionGate, Connector, JsonFileConnector, RetryPolicy, StaticConnector,
};
pub use error::{Result, StoreError};
pub use file::JsonFileDocumentStore;
pub use filter::{Condition, Filter, FindOptions, SortOrder, SortSpec, Stage};
pub use memory::MemoryDocumentStore;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Replace-or-insert request.
///
/// The first document matching `filter` is replaced by `document`; values at
/// the `preserve` paths are carried over from the replaced document when it
/// has them. Without a match, `document` is inserted as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub filter: Filter,
    pub document: Document,
    pub preserve: Vec<String>,
}

impl Upsert {
    pub fn new(filter: Filter, document: Document) -> Self {
        Self {
            filter,
            document,
            preserve: Vec::new(),
        }
    }

    pub fn preserving(mut self, path: impl Into<String>) -> Self {
        self.preserve.push(path.into());
        self
    }
}

/// Result of an upsert: whether it inserted, and the document as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub inserted: bool,
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f64,
}

/// Minimal document-store capability consumed by the graph layer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_one(&self, collection: &str, upsert: Upsert) -> Result<UpsertOutcome>;

    /// Applies every upsert in one round trip, in order.
    async fn upsert_many(
        &self,
        collection: &str,
        upserts: Vec<Upsert>,
    ) -> Result<Vec<UpsertOutcome>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>>;

    /// Returns the number of removed documents (0 or 1).
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Distinct values of `field` among matching documents, in first-seen order.
    async fn distinct(&self, collection: &str, field: &str, filter: &Filter) -> Result<Vec<Value>>;

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>>;

    /// Matches `query` against the string at `field`, highest score first.
    /// Documents that score zero are not returned.
    async fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>>;
}
