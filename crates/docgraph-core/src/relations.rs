//! Relation documents.
//!
//! A relation is keyed by its `(fromEntityId, toEntityId)` pair alone: saving
//! a second relation between the same endpoints replaces the first, whatever
//! its type or owner. `relationId` is rederived from the saved value, and the
//! original `metadata.createdAt` survives the replacement.

use std::sync::Arc;

use docgraph_store::{ConnectionGate, Filter, FindOptions, SortSpec, Upsert};

use crate::collections::RELATIONS;
use crate::error::Result;
use crate::model::{
    from_document, from_documents, to_user_document, validate_user, Relation, USER_ID,
};
use crate::summary::SummaryRefresher;

#[derive(Clone)]
pub struct RelationStore {
    gate: Arc<ConnectionGate>,
    refresher: SummaryRefresher,
}

impl RelationStore {
    pub fn new(gate: Arc<ConnectionGate>, refresher: SummaryRefresher) -> Self {
        Self { gate, refresher }
    }

    /// Saves `relation` for `user_id`, replacing any relation with the same
    /// endpoints. Returns the relation as stored.
    pub async fn save_relation(&self, user_id: &str, relation: &Relation) -> Result<Relation> {
        validate_user(user_id)?;
        relation.validate()?;

        let mut relation = relation.clone();
        relation.relation_id = relation.derive_id();

        let doc = to_user_document("relation", user_id, &relation)?;
        let key = Filter::new()
            .eq("fromEntityId", relation.from_entity_id.as_str())
            .eq("toEntityId", relation.to_entity_id.as_str());

        let store = self.gate.store().await?;
        let outcome = store
            .upsert_one(RELATIONS, Upsert::new(key, doc).preserving("metadata.createdAt"))
            .await?;
        tracing::debug!(
            user_id,
            relation_id = %relation.relation_id,
            inserted = outcome.inserted,
            "relation saved"
        );

        self.refresher.schedule(user_id);
        from_document("relation", outcome.document)
    }

    /// Every relation of the user with `entity_id` at either end.
    pub async fn get_relations(&self, user_id: &str, entity_id: &str) -> Result<Vec<Relation>> {
        self.relations_touching(user_id, &[entity_id.to_string()])
            .await
    }

    /// Removes the user's `from -> to` edge. Returns whether one existed.
    pub async fn delete_relation(
        &self,
        user_id: &str,
        from_entity_id: &str,
        to_entity_id: &str,
    ) -> Result<bool> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        let removed = store
            .delete_one(
                RELATIONS,
                &Filter::new()
                    .eq(USER_ID, user_id)
                    .eq("fromEntityId", from_entity_id)
                    .eq("toEntityId", to_entity_id),
            )
            .await?;
        if removed > 0 {
            tracing::debug!(user_id, from_entity_id, to_entity_id, "relation deleted");
            self.refresher.schedule(user_id);
        }
        Ok(removed > 0)
    }

    /// Every relation of the user, oldest first.
    pub async fn all_relations(&self, user_id: &str) -> Result<Vec<Relation>> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        let docs = store
            .find(
                RELATIONS,
                &Filter::new().eq(USER_ID, user_id),
                FindOptions::default().sorted_by(SortSpec::ascending("metadata.createdAt")),
            )
            .await?;
        from_documents("relation", docs)
    }

    /// The user's relations with either endpoint in `entity_ids`.
    pub async fn relations_touching(
        &self,
        user_id: &str,
        entity_ids: &[String],
    ) -> Result<Vec<Relation>> {
        validate_user(user_id)?;
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.gate.store().await?;
        let docs = store
            .find(
                RELATIONS,
                &touching(user_id, entity_ids),
                FindOptions::default(),
            )
            .await?;
        from_documents("relation", docs)
    }

    /// Removes the user's relations with either endpoint equal to
    /// `entity_id`. Does not schedule a summary refresh.
    pub(crate) async fn delete_touching(&self, user_id: &str, entity_id: &str) -> Result<u64> {
        let store = self.gate.store().await?;
        let ids = [entity_id.to_string()];
        Ok(store
            .delete_many(RELATIONS, &touching(user_id, &ids))
            .await?)
    }

    pub(crate) async fn delete_all(&self, user_id: &str) -> Result<u64> {
        let store = self.gate.store().await?;
        Ok(store
            .delete_many(RELATIONS, &Filter::new().eq(USER_ID, user_id))
            .await?)
    }
}

fn touching(user_id: &str, entity_ids: &[String]) -> Filter {
    Filter::new().eq(USER_ID, user_id).any_of(vec![
        Filter::new().is_in("fromEntityId", entity_ids.iter().cloned()),
        Filter::new().is_in("toEntityId", entity_ids.iter().cloned()),
    ])
}
