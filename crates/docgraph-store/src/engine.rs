//! Collection bookkeeping shared by the in-memory and JSON-file engines.
//!
//! Each collection is a `Vec<Document>` kept in insertion order; replacing a
//! document keeps its position, so sorts and text-search ties stay stable.

use std::collections::HashMap;

use serde_json::Value;

use crate::filter::{get_path, run_pipeline, set_path, sort_documents, Filter, FindOptions, Stage};
use crate::text;
use crate::{Document, ScoredDocument, Upsert, UpsertOutcome};

#[derive(Debug, Default, Clone)]
pub(crate) struct CollectionSet {
    collections: HashMap<String, Vec<Document>>,
}

impl CollectionSet {
    pub(crate) fn from_collections(collections: HashMap<String, Vec<Document>>) -> Self {
        Self { collections }
    }

    pub(crate) fn collection(&self, name: &str) -> &[Document] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A set holding a copy of one collection, for staged mutation.
    pub(crate) fn staged(&self, name: &str) -> Self {
        let mut collections = HashMap::new();
        collections.insert(name.to_string(), self.collection(name).to_vec());
        Self { collections }
    }

    pub(crate) fn commit(&mut self, name: &str, staged: CollectionSet) {
        let docs = staged
            .collections
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
            .unwrap_or_default();
        self.collections.insert(name.to_string(), docs);
    }

    pub(crate) fn upsert(&mut self, collection: &str, upsert: Upsert) -> UpsertOutcome {
        let docs = self.collections.entry(collection.to_string()).or_default();
        let Upsert {
            filter,
            mut document,
            preserve,
        } = upsert;

        match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(existing) => {
                for path in &preserve {
                    if let Some(value) = get_path(existing, path).cloned() {
                        set_path(&mut document, path, value);
                    }
                }
                *existing = document.clone();
                UpsertOutcome {
                    inserted: false,
                    document,
                }
            }
            None => {
                docs.push(document.clone());
                UpsertOutcome {
                    inserted: true,
                    document,
                }
            }
        }
    }

    pub(crate) fn find_one(&self, collection: &str, filter: &Filter) -> Option<Document> {
        self.collection(collection)
            .iter()
            .find(|d| filter.matches(d))
            .cloned()
    }

    pub(crate) fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Vec<Document> {
        let mut out: Vec<Document> = self
            .collection(collection)
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        sort_documents(&mut out, &options.sort);
        if let Some(limit) = options.limit {
            out.truncate(limit);
        }
        out
    }

    pub(crate) fn delete(&mut self, collection: &str, filter: &Filter, first_only: bool) -> u64 {
        let Some(docs) = self.collections.get_mut(collection) else {
            return 0;
        };
        if first_only {
            return match docs.iter().position(|d| filter.matches(d)) {
                Some(idx) => {
                    docs.remove(idx);
                    1
                }
                None => 0,
            };
        }
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        (before - docs.len()) as u64
    }

    pub(crate) fn distinct(&self, collection: &str, field: &str, filter: &Filter) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        for doc in self.collection(collection) {
            if !filter.matches(doc) {
                continue;
            }
            if let Some(v) = get_path(doc, field) {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
        }
        out
    }

    pub(crate) fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Vec<Document> {
        // Leading matches run before cloning so large collections are not copied wholesale.
        let mut stages = pipeline;
        let mut docs: Vec<Document> = match stages.first() {
            Some(Stage::Match(filter)) => {
                stages = &stages[1..];
                self.collection(collection)
                    .iter()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            }
            _ => self.collection(collection).to_vec(),
        };
        docs = run_pipeline(docs, stages);
        docs
    }

    pub(crate) fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        query: &str,
        limit: usize,
    ) -> Vec<ScoredDocument> {
        let terms = text::query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut hits: Vec<ScoredDocument> = self
            .collection(collection)
            .iter()
            .filter(|d| filter.matches(d))
            .filter_map(|d| {
                let body = get_path(d, field)?.as_str()?;
                let score = text::score(&terms, body);
                (score > 0.0).then(|| ScoredDocument {
                    document: d.clone(),
                    score,
                })
            })
            .collect();
        // Stable: equal scores keep collection order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_upsert_preserves_listed_paths() {
        let mut set = CollectionSet::default();
        let filter = Filter::new().eq("id", "a");

        let first = set.upsert(
            "things",
            Upsert::new(
                filter.clone(),
                doc(json!({"id": "a", "meta": {"createdAt": "t0", "updatedAt": "t0"}})),
            )
            .preserving("meta.createdAt"),
        );
        assert!(first.inserted);

        let second = set.upsert(
            "things",
            Upsert::new(
                filter.clone(),
                doc(json!({"id": "a", "meta": {"createdAt": "t9", "updatedAt": "t1"}})),
            )
            .preserving("meta.createdAt"),
        );
        assert!(!second.inserted);
        assert_eq!(second.document["meta"]["createdAt"], json!("t0"));
        assert_eq!(second.document["meta"]["updatedAt"], json!("t1"));
        assert_eq!(set.collection("things").len(), 1);
    }

    #[test]
    fn test_delete_one_and_many() {
        let mut set = CollectionSet::default();
        for i in 0..3 {
            set.upsert(
                "c",
                Upsert::new(
                    Filter::new().eq("i", i),
                    doc(json!({"i": i, "group": "g"})),
                ),
            );
        }
        assert_eq!(set.delete("c", &Filter::new().eq("group", "g"), true), 1);
        assert_eq!(set.delete("c", &Filter::new().eq("group", "g"), false), 2);
        assert_eq!(set.delete("missing", &Filter::new(), false), 0);
    }

    #[test]
    fn test_text_search_ties_keep_collection_order() {
        let mut set = CollectionSet::default();
        for name in ["first", "second", "third"] {
            set.upsert(
                "c",
                Upsert::new(
                    Filter::new().eq("name", name),
                    doc(json!({"name": name, "body": format!("{name} shared word")})),
                ),
            );
        }
        let hits = set.text_search("c", &Filter::new(), "body", "shared", 10);
        let names: Vec<_> = hits.iter().map(|h| h.document["name"].clone()).collect();
        assert_eq!(names, vec![json!("first"), json!("second"), json!("third")]);

        let top = set.text_search("c", &Filter::new(), "body", "second shared", 1);
        assert_eq!(top[0].document["name"], json!("second"));
    }
}
