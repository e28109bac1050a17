//! Integration tests for the complete docgraph stack
//!
//! These tests verify end-to-end functionality across crates:
//! - GraphStorage → ConnectionGate → DocumentStore engines
//! - Writes → background summary refresh → summary reads
//! - JSON-file persistence across restarts
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use std::time::Duration;

use docgraph_core::{
    Entity, GraphError, GraphStorage, GraphStoreConfig, KnowledgeGraph, Relation,
    UserGraphStorage,
};
use docgraph_store::BackendConfig;
use tempfile::tempdir;

fn file_config(dir: &std::path::Path) -> GraphStoreConfig {
    GraphStoreConfig::default().with_backend(BackendConfig::JsonFile {
        dir: dir.to_path_buf(),
    })
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test]
async fn test_person_visits_place_then_place_is_deleted() {
    let storage = GraphStorage::open(GraphStoreConfig::default());

    storage
        .save_entity("u", &Entity::new("A", "Alice", "person"))
        .await
        .unwrap();
    storage
        .save_entity("u", &Entity::new("B", "Berlin", "place"))
        .await
        .unwrap();
    storage
        .save_relation("u", &Relation::new("A", "visited", "B"))
        .await
        .unwrap();

    let neighbourhood = storage.get_connected_entities("u", "A", 1).await.unwrap();
    let ids: Vec<_> = neighbourhood
        .entities
        .iter()
        .map(|e| e.entity_id.as_str())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(neighbourhood.relations.len(), 1);
    assert_eq!(neighbourhood.relations[0].relation_id, "A|visited|B");

    assert!(storage.delete_entity("u", "B").await.unwrap());

    assert!(storage.get_relations("u", "A").await.unwrap().is_empty());
    assert!(storage.get_entity("u", "B").await.unwrap().is_none());

    storage.shutdown().await;
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();

    // First session: add data
    {
        let storage = GraphStorage::open(file_config(dir.path()));
        let graph = KnowledgeGraph {
            entities: vec![
                Entity::new("ti", "Titanium", "material").with_observations(["light", "strong"]),
                Entity::new("mill", "Carbide End Mill", "tool"),
            ],
            relations: vec![Relation::new("mill", "cuts", "ti").with_confidence(0.9)],
        };
        storage.save_for_user("shop", &graph).await.unwrap();
        storage.shutdown().await;
    }

    assert!(dir.path().join("entities.json").exists());
    assert!(dir.path().join("relations.json").exists());

    // Second session: verify data persisted
    {
        let storage = GraphStorage::open(file_config(dir.path()));
        let loaded = storage.load_for_user("shop").await.unwrap();
        assert_eq!(loaded.entities.len(), 2);
        assert_eq!(loaded.relations.len(), 1);
        assert_eq!(loaded.relations[0].metadata.confidence, Some(0.9));

        let ti = storage.get_entity("shop", "ti").await.unwrap().unwrap();
        assert_eq!(ti.search_text, "titanium material light strong");

        let summary = storage.get_user_summary("shop").await.unwrap();
        assert_eq!(summary.total_entities, 2);
        assert_eq!(summary.total_relations, 1);

        let hits = storage
            .search_entities("shop", "strong", None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "ti");
        storage.shutdown().await;
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_unreachable_store_fails_only_the_calling_operation() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    // A plain file where the data directory should be.
    std::fs::write(&data, b"not a directory").unwrap();

    let mut config = file_config(&data);
    config.connection.max_retries = 1;
    config.connection.initial_backoff_ms = 1;
    let storage = GraphStorage::open(config);

    let err = storage.get_entity("u", "a").await.unwrap_err();
    assert!(matches!(err, GraphError::Connection { attempts: 2, .. }));

    // The gate stays open for a later attempt.
    std::fs::remove_file(&data).unwrap();
    storage
        .save_entity("u", &Entity::new("a", "Ann", "person"))
        .await
        .unwrap();
    assert!(storage.get_entity("u", "a").await.unwrap().is_some());
    storage.shutdown().await;
}

// ============================================================================
// Concurrent Access Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_writes() {
    use tokio::task::JoinSet;

    let dir = tempdir().unwrap();
    let storage = Arc::new(GraphStorage::open(file_config(dir.path())));

    // Spawn multiple tasks
    let mut set = JoinSet::new();

    for i in 0..10 {
        let storage_clone = Arc::clone(&storage);
        set.spawn(async move {
            let user = if i % 2 == 0 { "even" } else { "odd" };
            storage_clone
                .save_entity(
                    user,
                    &Entity::new(format!("e{i}"), format!("Entity {i}"), "test"),
                )
                .await
                .unwrap();
            storage_clone
                .save_relation(user, &Relation::new(format!("e{i}"), "next", format!("e{}", i + 2)))
                .await
                .unwrap();
        });
    }

    // Wait for all
    while let Some(result) = set.join_next().await {
        result.unwrap();
    }

    assert_eq!(storage.load_for_user("even").await.unwrap().entities.len(), 5);
    assert_eq!(storage.load_for_user("odd").await.unwrap().relations.len(), 5);
    assert_eq!(storage.list_users().await.unwrap(), vec!["even", "odd"]);

    // Chains e0 -> e2 -> e4 -> e6 -> e8 -> (e10)
    let chain = storage
        .get_connected_entities("even", "e0", 10)
        .await
        .unwrap();
    assert_eq!(chain.entities.len(), 5);
    assert_eq!(chain.relations.len(), 5);

    let mut converged = false;
    for _ in 0..200 {
        if storage.get_user_summary("even").await.unwrap().total_entities == 5 {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(converged, "summary should catch up with concurrent writes");
    storage.shutdown().await;
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_traversal_returns_no_partial_graph() {
    let storage = GraphStorage::open(GraphStoreConfig::default());
    storage
        .save_entity("u", &Entity::new("a", "Ann", "person"))
        .await
        .unwrap();

    let result = storage
        .get_connected_entities_until("u", "a", 3, std::future::ready(()))
        .await;
    assert!(matches!(result, Err(GraphError::Cancelled)));
}

#[tokio::test]
async fn test_empty_graph_save_is_a_no_op() {
    let storage = GraphStorage::open(GraphStoreConfig::default());
    storage
        .save_for_user("u", &KnowledgeGraph::default())
        .await
        .unwrap();
    assert!(!storage.exists_for_user("u").await.unwrap());
    assert!(storage.list_users().await.unwrap().is_empty());
}
