//! Per-user summary index and its background refresher.
//!
//! ```text
//!  save/delete ──► SummaryRefresher::schedule(user) ──try_send──► [bounded queue]
//!      │ (returns immediately)                                        │
//!      ▼                                                              ▼
//!   caller                                             SummaryWorker task
//!                                                     update_summary_index(user)
//! ```
//!
//! Staleness contract:
//! - A user already waiting in the queue is not queued twice; the refresh
//!   reads current state when it runs, so the latest write wins.
//! - A request that arrives while the user's refresh is running queues a new
//!   one (at-least-once).
//! - When the queue is full the user is marked dirty instead, and the next
//!   `get_user_summary` recomputes synchronously.
//! - Refresh failures are logged and swallowed; the user is marked dirty.
//! - Clearing a user withdraws its queued refresh, and a user with no
//!   entities and no relations has no stored summary record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use docgraph_store::{ConnectionGate, Filter, FindOptions, SortSpec, Stage, Upsert};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collections::{ENTITIES, RELATIONS, SUMMARIES};
use crate::config::SummaryConfig;
use crate::error::{GraphError, Result};
use crate::model::{
    from_document, from_documents, to_user_document, validate_user, Entity, GraphSummary,
    RecentEntity, SearchIndex, USER_ID,
};

#[derive(Debug, Default)]
struct RefreshState {
    /// Users with a refresh waiting in the queue.
    queued: DashSet<String>,
    /// Users whose cached summary must not be trusted.
    dirty: DashSet<String>,
    /// Refresh requests made by writers.
    requests: AtomicU64,
}

// ============================================================================
// Summary index
// ============================================================================

pub struct SummaryIndex {
    gate: Arc<ConnectionGate>,
    config: SummaryConfig,
    state: Arc<RefreshState>,
}

impl SummaryIndex {
    pub fn new(gate: Arc<ConnectionGate>, config: SummaryConfig) -> Self {
        Self {
            gate,
            config,
            state: Arc::new(RefreshState::default()),
        }
    }

    /// Recomputes the user's summary from current entity/relation state and
    /// stores it.
    pub async fn update_summary_index(&self, user_id: &str) -> Result<GraphSummary> {
        validate_user(user_id)?;
        // Cleared before reading so a write landing mid-refresh re-marks it.
        self.state.dirty.remove(user_id);
        let result = self.recompute_and_store(user_id).await;
        if result.is_err() {
            self.state.dirty.insert(user_id.to_string());
        }
        result
    }

    async fn recompute_and_store(&self, user_id: &str) -> Result<GraphSummary> {
        let summary = self.compute(user_id).await?;
        let store = self.gate.store().await?;
        let key = Filter::new().eq(USER_ID, user_id);
        if summary.total_entities == 0 && summary.total_relations == 0 {
            store.delete_one(SUMMARIES, &key).await?;
            tracing::debug!(user_id, "empty graph; no summary stored");
            return Ok(summary);
        }
        let doc = to_user_document("summary", user_id, &summary)?;
        store.upsert_one(SUMMARIES, Upsert::new(key, doc)).await?;
        tracing::debug!(
            user_id,
            entities = summary.total_entities,
            relations = summary.total_relations,
            "summary index refreshed"
        );
        Ok(summary)
    }

    /// Cached summary, or a freshly computed one when none is cached or the
    /// cached one is known to be stale.
    pub async fn get_user_summary(&self, user_id: &str) -> Result<GraphSummary> {
        validate_user(user_id)?;
        if !self.state.dirty.contains(user_id) {
            let store = self.gate.store().await?;
            let cached = store
                .find_one(SUMMARIES, &Filter::new().eq(USER_ID, user_id))
                .await?;
            if let Some(doc) = cached {
                return from_document("summary", doc);
            }
        }
        self.update_summary_index(user_id).await
    }

    /// Refresh requests writers have made since this index was created,
    /// including ones coalesced with a refresh already queued.
    pub fn refresh_requests(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Drops a queued refresh for `user_id` and distrusts whatever summary a
    /// refresh already running might store.
    pub(crate) fn forget(&self, user_id: &str) {
        self.state.queued.remove(user_id);
        self.mark_dirty(user_id);
    }

    pub async fn delete_summary(&self, user_id: &str) -> Result<bool> {
        validate_user(user_id)?;
        let store = self.gate.store().await?;
        let removed = store
            .delete_one(SUMMARIES, &Filter::new().eq(USER_ID, user_id))
            .await?;
        Ok(removed > 0)
    }

    async fn compute(&self, user_id: &str) -> Result<GraphSummary> {
        let store = self.gate.store().await?;
        let user = Filter::new().eq(USER_ID, user_id);

        let count_entities = [
            Stage::Match(user.clone()),
            Stage::Count {
                output: "total".to_string(),
            },
        ];
        let count_relations = count_entities.clone();
        let histogram = [
            Stage::Match(user.clone()),
            Stage::GroupCount {
                field: "entityType".to_string(),
            },
        ];
        let recent = [
            Stage::Match(user.clone()),
            Stage::Sort(vec![SortSpec::descending("metadata.updatedAt")]),
            Stage::Limit(self.config.recent_limit),
        ];

        let (entity_count, relation_count, type_groups, recent_docs, all_docs) = tokio::try_join!(
            store.aggregate(ENTITIES, &count_entities),
            store.aggregate(RELATIONS, &count_relations),
            store.aggregate(ENTITIES, &histogram),
            store.aggregate(ENTITIES, &recent),
            store.find(ENTITIES, &user, FindOptions::default()),
        )?;

        let mut entity_types = std::collections::BTreeMap::new();
        for group in type_groups {
            let Some(name) = group.get("_id").and_then(Value::as_str) else {
                continue;
            };
            let count = group.get("count").and_then(Value::as_u64).unwrap_or(0);
            entity_types.insert(name.to_string(), count);
        }

        let recent_entities = from_documents::<Entity>("entity", recent_docs)?
            .into_iter()
            .map(|e| RecentEntity {
                entity_id: e.entity_id,
                name: e.name,
                entity_type: e.entity_type,
                updated_at: e.metadata.updated_at,
            })
            .collect();

        let entities: Vec<Entity> = from_documents("entity", all_docs)?;

        Ok(GraphSummary {
            user_id: user_id.to_string(),
            total_entities: first_count(&entity_count),
            total_relations: first_count(&relation_count),
            entity_types,
            recent_entities,
            search_index: build_search_index(&entities, self.config.frequent_terms_limit),
            updated_at: Utc::now(),
        })
    }

    fn mark_dirty(&self, user_id: &str) {
        self.state.dirty.insert(user_id.to_string());
    }
}

fn first_count(docs: &[docgraph_store::Document]) -> u64 {
    docs.first()
        .and_then(|d| d.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Most frequent search-text tokens (ties alphabetical) plus sorted names.
fn build_search_index(entities: &[Entity], terms_limit: usize) -> SearchIndex {
    let mut frequency: HashMap<String, u64> = HashMap::new();
    for entity in entities {
        for token in docgraph_store::text::tokenize(&entity.search_text) {
            *frequency.entry(token).or_insert(0) += 1;
        }
    }
    let mut terms: Vec<(String, u64)> = frequency.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut entity_names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
    entity_names.sort();
    entity_names.dedup();

    SearchIndex {
        frequent_terms: terms
            .into_iter()
            .take(terms_limit)
            .map(|(t, _)| t)
            .collect(),
        entity_names,
    }
}

// ============================================================================
// Background refresh
// ============================================================================

enum SummaryCommand {
    Refresh(String),
    Shutdown,
}

/// Cheap handle used by writers to request a refresh.
#[derive(Clone)]
pub struct SummaryRefresher {
    tx: mpsc::Sender<SummaryCommand>,
    index: Arc<SummaryIndex>,
}

impl SummaryRefresher {
    /// Requests a refresh without waiting.
    pub fn schedule(&self, user_id: &str) {
        let state = &self.index.state;
        state.requests.fetch_add(1, Ordering::Relaxed);
        if !state.queued.insert(user_id.to_string()) {
            return;
        }
        match self.tx.try_send(SummaryCommand::Refresh(user_id.to_string())) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                state.queued.remove(user_id);
                self.index.mark_dirty(user_id);
                tracing::warn!(user_id, "summary queue full; next read recomputes");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                state.queued.remove(user_id);
                self.index.mark_dirty(user_id);
                tracing::debug!(user_id, "summary worker stopped; next read recomputes");
            }
        }
    }
}

/// Dedicated consumer of the refresh queue.
pub struct SummaryWorker {
    tx: mpsc::Sender<SummaryCommand>,
    handle: JoinHandle<()>,
}

impl SummaryWorker {
    /// Spawns the consumer task; must be called inside a Tokio runtime.
    pub fn spawn(index: Arc<SummaryIndex>) -> (SummaryRefresher, SummaryWorker) {
        let capacity = index.config.queue_capacity.max(1);
        let (tx, mut rx) = mpsc::channel(capacity);

        let consumer = Arc::clone(&index);
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let user_id = match command {
                    SummaryCommand::Refresh(user_id) => user_id,
                    SummaryCommand::Shutdown => break,
                };
                if consumer.state.queued.remove(&user_id).is_none() {
                    tracing::trace!(user_id = %user_id, "refresh withdrawn");
                    continue;
                }
                if let Err(source) = consumer.update_summary_index(&user_id).await {
                    let err = GraphError::IndexMaintenance {
                        user_id: user_id.clone(),
                        source: Box::new(source),
                    };
                    tracing::warn!(user_id = %user_id, error = %err, "summary refresh failed");
                }
            }
            tracing::debug!("summary worker stopped");
        });

        let refresher = SummaryRefresher {
            tx: tx.clone(),
            index,
        };
        (refresher, SummaryWorker { tx, handle })
    }

    /// Processes everything queued so far, then stops the task.
    pub async fn shutdown(self) {
        if self.tx.send(SummaryCommand::Shutdown).await.is_err() {
            tracing::debug!("summary worker already stopped");
        }
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "summary worker task failed");
        }
    }
}
