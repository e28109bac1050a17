//! Bounded breadth-first neighbourhood queries.
//!
//! The walk expands one BFS level per round trip:
//!
//! ```text
//!   level 0: [start]            ── entities(frontier) ──► result.entities
//!        │                       ── relations_touching(frontier) ──► result.relations
//!        ▼ unvisited other ends
//!   level 1: [n1, n2, ...]        ...
//!        ▼
//!   level = depth: entities only, no relations
//! ```
//!
//! Each id is visited at most once, at its shortest distance from the start,
//! which makes the result identical to expanding nodes one at a time from a
//! FIFO queue. A relation seen from both of its endpoints is reported once.
//! A start id with no entity document yields an empty graph; ids further out
//! that lack a document are still expanded through their relations.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use async_trait::async_trait;

use crate::config::TraversalConfig;
use crate::entities::EntityStore;
use crate::error::{GraphError, Result};
use crate::model::{validate_user, Entity, KnowledgeGraph, Relation};

/// Batched adjacency queries the traversal is written against.
#[async_trait]
pub trait AdjacencySource: Send + Sync {
    /// The existing entities among `ids`, in any order.
    async fn entities(&self, user_id: &str, ids: &[String]) -> Result<Vec<Entity>>;

    /// Relations with either endpoint in `ids`.
    async fn relations_touching(&self, user_id: &str, ids: &[String]) -> Result<Vec<Relation>>;
}

#[async_trait]
impl AdjacencySource for EntityStore {
    async fn entities(&self, user_id: &str, ids: &[String]) -> Result<Vec<Entity>> {
        self.get_entities_batch(user_id, ids).await
    }

    async fn relations_touching(&self, user_id: &str, ids: &[String]) -> Result<Vec<Relation>> {
        self.relations().relations_touching(user_id, ids).await
    }
}

pub struct GraphTraversal<S> {
    source: S,
    config: TraversalConfig,
}

impl<S: AdjacencySource> GraphTraversal<S> {
    pub fn new(source: S, config: TraversalConfig) -> Self {
        Self { source, config }
    }

    /// Entities within `depth` hops of `start_entity_id` and the relations
    /// that connect them, bounded by the configured timeout.
    pub async fn get_connected_entities(
        &self,
        user_id: &str,
        start_entity_id: &str,
        depth: usize,
    ) -> Result<KnowledgeGraph> {
        self.get_connected_entities_until(
            user_id,
            start_entity_id,
            depth,
            std::future::pending::<()>(),
        )
        .await
    }

    /// Like [`get_connected_entities`](Self::get_connected_entities), but
    /// gives up with [`GraphError::Cancelled`] as soon as `cancel` completes.
    /// Partial results are discarded.
    pub async fn get_connected_entities_until<C>(
        &self,
        user_id: &str,
        start_entity_id: &str,
        depth: usize,
        cancel: C,
    ) -> Result<KnowledgeGraph>
    where
        C: Future<Output = ()> + Send,
    {
        validate_user(user_id)?;
        let walk = self.walk(user_id, start_entity_id, depth);
        let bounded = async {
            match self.config.timeout() {
                Some(limit) => tokio::time::timeout(limit, walk)
                    .await
                    .unwrap_or(Err(GraphError::Timeout(limit))),
                None => walk.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!(user_id, start_entity_id, "traversal cancelled");
                Err(GraphError::Cancelled)
            }
            result = bounded => result,
        }
    }

    async fn walk(&self, user_id: &str, start: &str, depth: usize) -> Result<KnowledgeGraph> {
        let mut graph = KnowledgeGraph::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_edges: HashSet<(String, String)> = HashSet::new();
        let mut frontier = vec![start.to_string()];
        visited.insert(start.to_string());

        let mut level = 0;
        while !frontier.is_empty() {
            let mut found = self.fetch_entities(user_id, &frontier).await?;
            sort_by_frontier(&mut found, &frontier);
            tracing::debug!(
                user_id,
                level,
                frontier = frontier.len(),
                found = found.len(),
                "traversal level"
            );
            if level == 0 && found.is_empty() {
                return Ok(KnowledgeGraph::default());
            }
            graph.entities.extend(found);

            if level == depth {
                break;
            }

            let touching = self.fetch_relations(user_id, &frontier).await?;
            let mut next = Vec::new();
            for relation in touching {
                for end in [&relation.from_entity_id, &relation.to_entity_id] {
                    if visited.insert(end.clone()) {
                        next.push(end.clone());
                    }
                }
                let pair = (
                    relation.from_entity_id.clone(),
                    relation.to_entity_id.clone(),
                );
                if seen_edges.insert(pair) {
                    graph.relations.push(relation);
                }
            }

            frontier = next;
            level += 1;
        }

        Ok(graph)
    }

    async fn fetch_entities(&self, user_id: &str, ids: &[String]) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.batch_size.max(1)) {
            out.extend(self.source.entities(user_id, chunk).await?);
        }
        Ok(out)
    }

    async fn fetch_relations(&self, user_id: &str, ids: &[String]) -> Result<Vec<Relation>> {
        let mut out = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for chunk in ids.chunks(self.config.batch_size.max(1)) {
            for relation in self.source.relations_touching(user_id, chunk).await? {
                let pair = (
                    relation.from_entity_id.clone(),
                    relation.to_entity_id.clone(),
                );
                if seen.insert(pair) {
                    out.push(relation);
                }
            }
        }
        Ok(out)
    }
}

fn sort_by_frontier(entities: &mut [Entity], frontier: &[String]) {
    let rank: HashMap<&str, usize> = frontier
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    entities.sort_by_key(|e| rank.get(e.entity_id.as_str()).copied().unwrap_or(usize::MAX));
}
