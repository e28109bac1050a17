//! `GraphStorage`: the single entry point wiring every component together.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use docgraph_store::{ConnectionGate, Connector};
use parking_lot::Mutex;

use crate::config::GraphStoreConfig;
use crate::entities::EntityStore;
use crate::error::Result;
use crate::model::{Entity, GraphSummary, KnowledgeGraph, Relation};
use crate::relations::RelationStore;
use crate::summary::{SummaryIndex, SummaryWorker};
use crate::traversal::GraphTraversal;

/// Whole-graph lifecycle per user, as consumed by storage-selection code.
#[async_trait]
pub trait UserGraphStorage: Send + Sync {
    /// Saves every entity, then every relation. Relation ids are rederived.
    async fn save_for_user(&self, user_id: &str, graph: &KnowledgeGraph) -> Result<()>;

    /// Full scan of the user's entities and relations.
    async fn load_for_user(&self, user_id: &str) -> Result<KnowledgeGraph>;

    async fn exists_for_user(&self, user_id: &str) -> Result<bool>;

    /// Removes the user's entities, relations and summary. The three deletes
    /// are independent; all are attempted and the first failure is returned.
    /// A refresh queued before the clear does not bring the summary back.
    async fn clear_for_user(&self, user_id: &str) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<String>>;
}

pub struct GraphStorage {
    gate: Arc<ConnectionGate>,
    entities: EntityStore,
    relations: RelationStore,
    summaries: Arc<SummaryIndex>,
    traversal: GraphTraversal<EntityStore>,
    worker: Mutex<Option<SummaryWorker>>,
}

impl GraphStorage {
    /// Builds storage over the configured backend. The connection is made on
    /// first use. Must be called inside a Tokio runtime.
    pub fn open(config: GraphStoreConfig) -> Self {
        let connector = config.backend.connector();
        Self::with_connector(connector, config)
    }

    /// Like [`open`](Self::open) with an explicit connector.
    pub fn with_connector(connector: Box<dyn Connector>, config: GraphStoreConfig) -> Self {
        let gate = Arc::new(ConnectionGate::new(
            connector,
            config.connection.retry_policy(),
        ));
        let summaries = Arc::new(SummaryIndex::new(Arc::clone(&gate), config.summary.clone()));
        let (refresher, worker) = SummaryWorker::spawn(Arc::clone(&summaries));

        let relations = RelationStore::new(Arc::clone(&gate), refresher.clone());
        let entities = EntityStore::new(
            Arc::clone(&gate),
            relations.clone(),
            refresher,
            config.search.default_limit,
        );
        let traversal = GraphTraversal::new(entities.clone(), config.traversal.clone());

        Self {
            gate,
            entities,
            relations,
            summaries,
            traversal,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Connects now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        self.gate.store().await?;
        Ok(())
    }

    /// Lets the summary worker finish queued refreshes and stops it. Later
    /// writes mark their user dirty instead of queueing.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.shutdown().await;
            tracing::info!("graph storage shut down");
        }
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn relations(&self) -> &RelationStore {
        &self.relations
    }

    pub fn summaries(&self) -> &SummaryIndex {
        &self.summaries
    }

    // ------------------------------------------------------------------------
    // Entity operations
    // ------------------------------------------------------------------------

    pub async fn save_entity(&self, user_id: &str, entity: &Entity) -> Result<Entity> {
        self.entities.save_entity(user_id, entity).await
    }

    pub async fn get_entity(&self, user_id: &str, entity_id: &str) -> Result<Option<Entity>> {
        self.entities.get_entity(user_id, entity_id).await
    }

    pub async fn search_entities(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>> {
        self.entities.search_entities(user_id, query, limit).await
    }

    pub async fn delete_entity(&self, user_id: &str, entity_id: &str) -> Result<bool> {
        self.entities.delete_entity(user_id, entity_id).await
    }

    pub async fn save_entities_batch(&self, user_id: &str, entities: &[Entity]) -> Result<usize> {
        self.entities.save_entities_batch(user_id, entities).await
    }

    pub async fn get_entities_batch(
        &self,
        user_id: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Entity>> {
        self.entities.get_entities_batch(user_id, entity_ids).await
    }

    pub async fn add_observations(
        &self,
        user_id: &str,
        entity_id: &str,
        observations: &[String],
    ) -> Result<Option<Vec<String>>> {
        self.entities
            .add_observations(user_id, entity_id, observations)
            .await
    }

    pub async fn delete_observations(
        &self,
        user_id: &str,
        entity_id: &str,
        observations: &[String],
    ) -> Result<Option<Vec<String>>> {
        self.entities
            .delete_observations(user_id, entity_id, observations)
            .await
    }

    // ------------------------------------------------------------------------
    // Relation operations
    // ------------------------------------------------------------------------

    pub async fn save_relation(&self, user_id: &str, relation: &Relation) -> Result<Relation> {
        self.relations.save_relation(user_id, relation).await
    }

    pub async fn get_relations(&self, user_id: &str, entity_id: &str) -> Result<Vec<Relation>> {
        self.relations.get_relations(user_id, entity_id).await
    }

    pub async fn delete_relation(
        &self,
        user_id: &str,
        from_entity_id: &str,
        to_entity_id: &str,
    ) -> Result<bool> {
        self.relations
            .delete_relation(user_id, from_entity_id, to_entity_id)
            .await
    }

    // ------------------------------------------------------------------------
    // Graph operations
    // ------------------------------------------------------------------------

    pub async fn get_connected_entities(
        &self,
        user_id: &str,
        entity_id: &str,
        depth: usize,
    ) -> Result<KnowledgeGraph> {
        self.traversal
            .get_connected_entities(user_id, entity_id, depth)
            .await
    }

    pub async fn get_connected_entities_until<C>(
        &self,
        user_id: &str,
        entity_id: &str,
        depth: usize,
        cancel: C,
    ) -> Result<KnowledgeGraph>
    where
        C: Future<Output = ()> + Send,
    {
        self.traversal
            .get_connected_entities_until(user_id, entity_id, depth, cancel)
            .await
    }

    pub async fn get_user_summary(&self, user_id: &str) -> Result<GraphSummary> {
        self.summaries.get_user_summary(user_id).await
    }

    /// Recomputes the summary now, bypassing the worker.
    pub async fn update_summary_index(&self, user_id: &str) -> Result<GraphSummary> {
        self.summaries.update_summary_index(user_id).await
    }
}

#[async_trait]
impl UserGraphStorage for GraphStorage {
    async fn save_for_user(&self, user_id: &str, graph: &KnowledgeGraph) -> Result<()> {
        self.entities
            .save_entities_batch(user_id, &graph.entities)
            .await?;
        for relation in &graph.relations {
            self.relations.save_relation(user_id, relation).await?;
        }
        tracing::info!(
            user_id,
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "graph saved"
        );
        Ok(())
    }

    async fn load_for_user(&self, user_id: &str) -> Result<KnowledgeGraph> {
        let (entities, relations) = tokio::try_join!(
            self.entities.all_entities(user_id),
            self.relations.all_relations(user_id),
        )?;
        Ok(KnowledgeGraph {
            entities,
            relations,
        })
    }

    async fn exists_for_user(&self, user_id: &str) -> Result<bool> {
        self.entities.has_entities(user_id).await
    }

    async fn clear_for_user(&self, user_id: &str) -> Result<()> {
        crate::model::validate_user(user_id)?;
        let (entities, relations, summary) = tokio::join!(
            self.entities.delete_all(user_id),
            self.relations.delete_all(user_id),
            self.summaries.delete_summary(user_id),
        );
        self.summaries.forget(user_id);
        match (&entities, &relations, &summary) {
            (Ok(e), Ok(r), Ok(s)) => {
                tracing::info!(user_id, entities = e, relations = r, summary = s, "user cleared");
            }
            _ => tracing::warn!(user_id, "user clear partially failed"),
        }
        entities?;
        relations?;
        summary?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        self.entities.list_users().await
    }
}
