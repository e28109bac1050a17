//! Behavioural tests run against every engine through the `DocumentStore` trait.

use std::sync::Arc;

use docgraph_store::*;
use serde_json::{json, Value};
use tempfile::tempdir;

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

async fn seed(store: &dyn DocumentStore) {
    let rows = [
        ("u1", "alice", "person", "2026-01-01T00:00:01Z", "alice person likes coffee"),
        ("u1", "bob", "person", "2026-01-01T00:00:03Z", "bob person drinks coffee coffee"),
        ("u1", "paris", "place", "2026-01-01T00:00:02Z", "paris place city"),
        ("u2", "carol", "person", "2026-01-01T00:00:04Z", "carol person likes coffee"),
    ];
    let upserts = rows
        .iter()
        .map(|(user, id, ty, ts, text)| {
            Upsert::new(
                Filter::new().eq("userId", *user).eq("entityId", *id),
                doc(json!({
                    "userId": user,
                    "entityId": id,
                    "entityType": ty,
                    "metadata": {"updatedAt": ts},
                    "searchText": text,
                })),
            )
        })
        .collect();
    let outcomes = store.upsert_many("entities", upserts).await.unwrap();
    assert!(outcomes.iter().all(|o| o.inserted));
}

async fn exercise(store: Arc<dyn DocumentStore>) {
    seed(store.as_ref()).await;
    let user = Filter::new().eq("userId", "u1");

    let counted = store
        .aggregate(
            "entities",
            &[
                Stage::Match(user.clone()),
                Stage::Count {
                    output: "total".to_string(),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(counted[0]["total"], json!(3));

    let types = store
        .aggregate(
            "entities",
            &[
                Stage::Match(user.clone()),
                Stage::GroupCount {
                    field: "entityType".to_string(),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(types.len(), 2);

    let recent = store
        .find(
            "entities",
            &user,
            FindOptions::default()
                .sorted_by(SortSpec::descending("metadata.updatedAt"))
                .limit(2),
        )
        .await
        .unwrap();
    let ids: Vec<_> = recent.iter().map(|d| d["entityId"].clone()).collect();
    assert_eq!(ids, vec![json!("bob"), json!("paris")]);

    let hits = store
        .text_search("entities", &user, "searchText", "coffee", 10)
        .await
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.document["entityId"].clone()).collect();
    assert_eq!(ids, vec![json!("bob"), json!("alice")]);

    let users = store
        .distinct("entities", "userId", &Filter::new())
        .await
        .unwrap();
    assert_eq!(users, vec![json!("u1"), json!("u2")]);

    let removed = store.delete_many("entities", &user).await.unwrap();
    assert_eq!(removed, 3);
    assert!(store
        .find_one("entities", &Filter::new().eq("entityId", "alice"))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_one("entities", &Filter::new().eq("entityId", "carol"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_memory_engine() {
    exercise(Arc::new(MemoryDocumentStore::new())).await;
}

#[tokio::test]
async fn test_json_file_engine() {
    let dir = tempdir().unwrap();
    exercise(Arc::new(JsonFileDocumentStore::open(dir.path()).unwrap())).await;
}

#[tokio::test]
async fn test_backend_config_selects_engine() {
    let dir = tempdir().unwrap();
    let config: BackendConfig = serde_json::from_value(json!({
        "kind": "json_file",
        "dir": dir.path(),
    }))
    .unwrap();
    let gate = ConnectionGate::new(config.connector(), RetryPolicy::default());
    let store = gate.store().await.unwrap();
    store
        .upsert_one(
            "summaries",
            Upsert::new(Filter::new().eq("userId", "u1"), doc(json!({"userId": "u1"}))),
        )
        .await
        .unwrap();
    assert!(dir.path().join("summaries.json").exists());

    let memory: BackendConfig = serde_json::from_value(json!({"kind": "memory"})).unwrap();
    assert_eq!(memory, BackendConfig::Memory);
}
