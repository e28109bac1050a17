//! Entity documents.
//!
//! Entities are upserted by `(userId, entityId)`. Every save recomputes
//! `searchText` and stamps `metadata.updatedAt`. The first save stores the
//! entity's own `metadata.createdAt` (now, for [`Entity::new`]); later saves
//! keep the stored one.

use std::sync::Arc;

use chrono::Utc;
use docgraph_store::{ConnectionGate, Filter, FindOptions, SortSpec, Upsert};
use serde_json::Value;

use crate::collections::ENTITIES;
use crate::error::{GraphError, Result};
use crate::model::{
    from_document, from_documents, to_user_document, validate_user, Entity, USER_ID,
};
use crate::relations::RelationStore;
use crate::summary::SummaryRefresher;

#[derive(Clone)]
pub struct EntityStore {
    gate: Arc<ConnectionGate>,
    relations: RelationStore,
    refresher: SummaryRefresher,
    default_limit: usize,
}

impl EntityStore {
    pub fn new(
        gate: Arc<ConnectionGate>,
        relations: RelationStore,
        refresher: SummaryRefresher,
        default_limit: usize,
    ) -> Self {
        Self {
            gate,
            relations,
            refresher,
            default_limit,
        }
    }

    pub async fn save_entity(&self, user_id: &str, entity: &Entity) -> Result<Entity> {
        validate_user(user_id)?;
        let upsert = prepare(user_id, entity)?;

        let store = self.gate.store().await?;
        let outcome = store.upsert_one(ENTITIES, upsert).await?;
        tracing::debug!(
            user_id,
            entity_id = %entity.entity_id,
            inserted = outcome.inserted,
            "entity saved"
        );

        self.refresher.schedule(user_id);
        from_document("entity", outcome.document)
    }

    pub async fn get_entity(&self, user_id: &str, entity_id: &str) -> Result<Option<Entity>> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        store
            .find_one(ENTITIES, &key(user_id, entity_id))
            .await?
            .map(|doc| from_document("entity", doc))
            .transpose()
    }

    /// Ranked match of `query` against `searchText`, best first. `None` uses
    /// the configured default limit.
    pub async fn search_entities(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>> {
        validate_user(user_id)?;
        let limit = limit.unwrap_or(self.default_limit);
        let store = self.gate.store().await?;
        let hits = store
            .text_search(
                ENTITIES,
                &Filter::new().eq(USER_ID, user_id),
                "searchText",
                query,
                limit,
            )
            .await?;
        tracing::debug!(user_id, query, hits = hits.len(), "entity search");
        hits.into_iter()
            .map(|hit| from_document("entity", hit.document))
            .collect()
    }

    /// Deletes the entity and every relation of the user touching it.
    ///
    /// Relations are removed even when the entity itself was already gone.
    /// A cascade failure is reported as [`GraphError::Cascade`]; the entity
    /// stays deleted.
    pub async fn delete_entity(&self, user_id: &str, entity_id: &str) -> Result<bool> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        let removed = store
            .delete_one(ENTITIES, &key(user_id, entity_id))
            .await?
            > 0;

        let cascade = self.relations.delete_touching(user_id, entity_id).await;
        self.refresher.schedule(user_id);

        match cascade {
            Ok(relations) => {
                tracing::debug!(user_id, entity_id, removed, relations, "entity deleted");
                Ok(removed)
            }
            Err(source) => {
                tracing::warn!(user_id, entity_id, error = %source, "relation cascade failed");
                Err(GraphError::Cascade {
                    entity_id: entity_id.to_string(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Upserts all `entities` in one round trip. Nothing is written unless
    /// every entity is valid.
    pub async fn save_entities_batch(&self, user_id: &str, entities: &[Entity]) -> Result<usize> {
        validate_user(user_id)?;
        if entities.is_empty() {
            return Ok(0);
        }
        let upserts = entities
            .iter()
            .map(|e| prepare(user_id, e))
            .collect::<Result<Vec<_>>>()?;

        let store = self.gate.store().await?;
        let outcomes = store.upsert_many(ENTITIES, upserts).await?;
        let inserted = outcomes.iter().filter(|o| o.inserted).count();
        tracing::debug!(
            user_id,
            saved = outcomes.len(),
            inserted,
            "entity batch saved"
        );

        self.refresher.schedule(user_id);
        Ok(outcomes.len())
    }

    /// The existing entities among `entity_ids`; unknown ids are skipped.
    pub async fn get_entities_batch(
        &self,
        user_id: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Entity>> {
        validate_user(user_id)?;
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.gate.store().await?;
        let docs = store
            .find(
                ENTITIES,
                &Filter::new()
                    .eq(USER_ID, user_id)
                    .is_in("entityId", entity_ids.iter().cloned()),
                FindOptions::default(),
            )
            .await?;
        from_documents("entity", docs)
    }

    /// Appends the observations the entity does not have yet. Returns the
    /// ones added, or `None` if the entity does not exist.
    pub async fn add_observations(
        &self,
        user_id: &str,
        entity_id: &str,
        observations: &[String],
    ) -> Result<Option<Vec<String>>> {
        let Some(mut entity) = self.get_entity(user_id, entity_id).await? else {
            return Ok(None);
        };
        let mut added = Vec::new();
        for observation in observations {
            if !entity.observations.contains(observation) {
                entity.observations.push(observation.clone());
                added.push(observation.clone());
            }
        }
        if !added.is_empty() {
            self.save_entity(user_id, &entity).await?;
        }
        Ok(Some(added))
    }

    /// Removes the given observations. Returns the ones that were present,
    /// or `None` if the entity does not exist.
    pub async fn delete_observations(
        &self,
        user_id: &str,
        entity_id: &str,
        observations: &[String],
    ) -> Result<Option<Vec<String>>> {
        let Some(mut entity) = self.get_entity(user_id, entity_id).await? else {
            return Ok(None);
        };
        let mut removed = Vec::new();
        entity.observations.retain(|o| {
            let drop = observations.contains(o);
            if drop {
                removed.push(o.clone());
            }
            !drop
        });
        if !removed.is_empty() {
            self.save_entity(user_id, &entity).await?;
        }
        Ok(Some(removed))
    }

    /// Every entity of the user, oldest first.
    pub async fn all_entities(&self, user_id: &str) -> Result<Vec<Entity>> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        let docs = store
            .find(
                ENTITIES,
                &Filter::new().eq(USER_ID, user_id),
                FindOptions::default().sorted_by(SortSpec::ascending("metadata.createdAt")),
            )
            .await?;
        from_documents("entity", docs)
    }

    pub async fn has_entities(&self, user_id: &str) -> Result<bool> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        Ok(store
            .find_one(ENTITIES, &Filter::new().eq(USER_ID, user_id))
            .await?
            .is_some())
    }

    pub(crate) async fn delete_all(&self, user_id: &str) -> Result<u64> {
        let store = self.gate.store().await?;
        Ok(store
            .delete_many(ENTITIES, &Filter::new().eq(USER_ID, user_id))
            .await?)
    }

    /// Distinct owners of at least one entity, sorted.
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let store = self.gate.store().await?;
        let values = store.distinct(ENTITIES, USER_ID, &Filter::new()).await?;
        let mut users: Vec<String> = values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    pub(crate) fn relations(&self) -> &RelationStore {
        &self.relations
    }
}

fn key(user_id: &str, entity_id: &str) -> Filter {
    Filter::new()
        .eq(USER_ID, user_id)
        .eq("entityId", entity_id)
}

/// Validates `entity` and builds its upsert with the derived fields filled in.
fn prepare(user_id: &str, entity: &Entity) -> Result<Upsert> {
    entity.validate()?;
    let mut entity = entity.clone();
    entity.search_text = entity.compute_search_text();
    entity.metadata.updated_at = Utc::now();

    let doc = to_user_document("entity", user_id, &entity)?;
    Ok(Upsert::new(key(user_id, &entity.entity_id), doc).preserving("metadata.createdAt"))
}
