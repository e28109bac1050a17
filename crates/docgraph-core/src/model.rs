//! Graph documents: entities, relations, summaries.
//!
//! Field names serialize in camelCase; stored documents additionally carry a
//! `userId` field that is never part of these types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use docgraph_store::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, Result};

pub(crate) const USER_ID: &str = "userId";

// ============================================================================
// Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for EntityMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            relation_count: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Derived on save; anything set here by a caller is overwritten.
    #[serde(default)]
    pub search_text: String,
}

impl Entity {
    pub fn new(
        entity_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            observations: Vec::new(),
            tags: None,
            metadata: EntityMetadata::default(),
            search_text: String::new(),
        }
    }

    pub fn with_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observations = observations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Lowercased `name entityType observations… tags…`, single-space joined.
    pub fn compute_search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str(), self.entity_type.as_str()];
        parts.extend(self.observations.iter().map(String::as_str));
        if let Some(tags) = &self.tags {
            parts.extend(tags.iter().map(String::as_str));
        }
        parts.join(" ").to_lowercase()
    }

    pub fn validate(&self) -> Result<()> {
        require("entityId", &self.entity_id)?;
        require("name", &self.name)?;
        require("entityType", &self.entity_type)?;
        Ok(())
    }
}

// ============================================================================
// Relation
// ============================================================================

fn default_strength() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Default for RelationMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            source: None,
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Derived from the endpoints and type on save.
    #[serde(default)]
    pub relation_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relation_type: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub metadata: RelationMetadata,
}

impl Relation {
    pub fn new(
        from_entity_id: impl Into<String>,
        relation_type: impl Into<String>,
        to_entity_id: impl Into<String>,
    ) -> Self {
        let mut relation = Self {
            relation_id: String::new(),
            from_entity_id: from_entity_id.into(),
            to_entity_id: to_entity_id.into(),
            relation_type: relation_type.into(),
            strength: default_strength(),
            metadata: RelationMetadata::default(),
        };
        relation.relation_id = relation.derive_id();
        relation
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = Some(confidence);
        self
    }

    pub fn derive_id(&self) -> String {
        relation_id(&self.from_entity_id, &self.relation_type, &self.to_entity_id)
    }

    /// The endpoint opposite `entity_id`, if this relation touches it.
    pub fn other_end(&self, entity_id: &str) -> Option<&str> {
        if self.from_entity_id == entity_id {
            Some(&self.to_entity_id)
        } else if self.to_entity_id == entity_id {
            Some(&self.from_entity_id)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("fromEntityId", &self.from_entity_id)?;
        require("toEntityId", &self.to_entity_id)?;
        require("relationType", &self.relation_type)?;
        if !self.strength.is_finite() {
            return Err(GraphError::invalid("strength", "must be a finite number"));
        }
        Ok(())
    }
}

pub fn relation_id(from_entity_id: &str, relation_type: &str, to_entity_id: &str) -> String {
    format!("{from_entity_id}|{relation_type}|{to_entity_id}")
}

// ============================================================================
// Graph and summary
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl KnowledgeGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }

    pub fn entity_ids(&self) -> BTreeSet<String> {
        self.entities.iter().map(|e| e.entity_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntity {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub frequent_terms: Vec<String>,
    pub entity_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub user_id: String,
    pub total_entities: u64,
    pub total_relations: u64,
    pub entity_types: BTreeMap<String, u64>,
    pub recent_entities: Vec<RecentEntity>,
    pub search_index: SearchIndex,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Document mapping
// ============================================================================

pub(crate) fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GraphError::invalid(field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_user(user_id: &str) -> Result<()> {
    require("userId", user_id)
}

/// Serializes `value` and stamps it with the owning user.
pub(crate) fn to_user_document<T: Serialize>(
    kind: &'static str,
    user_id: &str,
    value: &T,
) -> Result<Document> {
    let value =
        serde_json::to_value(value).map_err(|source| GraphError::Decode { kind, source })?;
    let Value::Object(mut doc) = value else {
        return Err(GraphError::Decode {
            kind,
            source: serde::ser::Error::custom("expected a JSON object"),
        });
    };
    doc.insert(USER_ID.to_string(), Value::String(user_id.to_string()));
    Ok(doc)
}

pub(crate) fn from_document<T: DeserializeOwned>(kind: &'static str, doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|source| GraphError::Decode { kind, source })
}

pub(crate) fn from_documents<T: DeserializeOwned>(
    kind: &'static str,
    docs: Vec<Document>,
) -> Result<Vec<T>> {
    docs.into_iter().map(|d| from_document(kind, d)).collect()
}
