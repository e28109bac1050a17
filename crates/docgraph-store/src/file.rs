//! JSON-file engine
//!
//! One `<collection>.json` file per collection inside a data directory:
//! 1. All collections are loaded into memory on open
//! 2. Every mutation is staged on a copy of the touched collection
//! 3. The copy is written to `<collection>.json.tmp` and renamed over the
//!    live file, and only then becomes visible to readers
//!
//! A failed write therefore leaves both the file and the in-memory view at
//! their previous state.
//!
//! File writes run on Tokio's blocking pool. Writers are serialized by their
//! own lock; the view lock is only held to copy or swap a collection, so
//! readers never wait on disk I/O.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::CollectionSet;
use crate::error::{Result, StoreError};
use crate::filter::{Filter, FindOptions, Stage};
use crate::{Document, DocumentStore, ScoredDocument, Upsert, UpsertOutcome};

const FILE_EXTENSION: &str = "json";

pub struct JsonFileDocumentStore {
    dir: PathBuf,
    shared: Arc<Shared>,
}

struct Shared {
    view: Mutex<CollectionSet>,
    writer: Mutex<()>,
}

impl JsonFileDocumentStore {
    /// Open (creating if needed) a data directory and load every collection.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut collections = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if !path.extension().is_some_and(|e| e == FILE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let docs = read_collection_file(&path, name)?;
            tracing::debug!(collection = name, documents = docs.len(), "loaded collection");
            collections.insert(name.to_string(), docs);
        }

        Ok(Self {
            dir,
            shared: Arc::new(Shared {
                view: Mutex::new(CollectionSet::from_collections(collections)),
                writer: Mutex::new(()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidDocument {
                collection: collection.to_string(),
                reason: "collection names may only contain [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(self.dir.join(format!("{collection}.{FILE_EXTENSION}")))
    }

    /// Applies `op` to a staged copy of `collection`, persists it, then commits.
    async fn mutate<T, F>(&self, collection: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CollectionSet, &str) -> T + Send + 'static,
    {
        let path = self.collection_path(collection)?;
        let collection = collection.to_string();
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let _writer = shared.writer.lock();
            let mut staged = shared.view.lock().staged(&collection);
            let out = op(&mut staged, &collection);
            write_collection_file(&path, staged.collection(&collection))?;
            shared.view.lock().commit(&collection, staged);
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Unreachable(format!("writer task failed: {e}")))?
    }
}

fn read_collection_file(path: &Path, collection: &str) -> Result<Vec<Document>> {
    let contents = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let values: Vec<Value> = serde_json::from_str(&contents)?;
    values
        .into_iter()
        .map(|v| match v {
            Value::Object(doc) => Ok(doc),
            other => Err(StoreError::InvalidDocument {
                collection: collection.to_string(),
                reason: format!("expected object, found {other}"),
            }),
        })
        .collect()
}

fn write_collection_file(path: &Path, docs: &[Document]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(docs)?;
    fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn upsert_one(&self, collection: &str, upsert: Upsert) -> Result<UpsertOutcome> {
        self.mutate(collection, move |set, name| set.upsert(name, upsert)).await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        upserts: Vec<Upsert>,
    ) -> Result<Vec<UpsertOutcome>> {
        self.mutate(collection, move |set, name| {
            upserts
                .into_iter()
                .map(|u| set.upsert(name, u))
                .collect::<Vec<_>>()
        })
        .await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.shared.view.lock().find_one(collection, filter))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        Ok(self.shared.view.lock().find(collection, filter, &options))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        self.mutate(collection, move |set, name| set.delete(name, &filter, true)).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        self.mutate(collection, move |set, name| set.delete(name, &filter, false)).await
    }

    async fn distinct(&self, collection: &str, field: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self.shared.view.lock().distinct(collection, field, filter))
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>> {
        Ok(self.shared.view.lock().aggregate(collection, pipeline))
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
            .shared
            .view
            .lock()
            .text_search(collection, filter, field, query, limit))
    }
}
