//! Process-local engine. Nothing survives the process; used for tests and for
//! the CLI when no data directory is given.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::engine::CollectionSet;
use crate::error::Result;
use crate::filter::{Filter, FindOptions, Stage};
use crate::{Document, DocumentStore, ScoredDocument, Upsert, UpsertOutcome};

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<CollectionSet>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.inner.read().collection(collection).len()
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert_one(&self, collection: &str, upsert: Upsert) -> Result<UpsertOutcome> {
        Ok(self.inner.write().upsert(collection, upsert))
    }

    async fn upsert_many(
        &self,
        collection: &str,
        upserts: Vec<Upsert>,
    ) -> Result<Vec<UpsertOutcome>> {
        let mut inner = self.inner.write();
        Ok(upserts
            .into_iter()
            .map(|u| inner.upsert(collection, u))
            .collect())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.inner.read().find_one(collection, filter))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        Ok(self.inner.read().find(collection, filter, &options))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.inner.write().delete(collection, filter, true))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.inner.write().delete(collection, filter, false))
    }

    async fn distinct(&self, collection: &str, field: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self.inner.read().distinct(collection, field, filter))
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>> {
        Ok(self.inner.read().aggregate(collection, pipeline))
    }

    async fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        Ok(self
            .inner
            .read()
            .text_search(collection, filter, field, query, limit))
    }
}
