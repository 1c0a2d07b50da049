//! Quest catalog: read access to quest definitions.
//!
//! Definitions are immutable once published, so lookups are cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::error::QuestError;
use super::types::QuestDefinition;
use crate::storage::store::DocumentStore;

/// Read-through cache of quest definitions over a document store.
pub struct QuestCatalog<S: DocumentStore> {
    store: Arc<S>,
    cache: RwLock<HashMap<String, Arc<QuestDefinition>>>,
}

impl<S: DocumentStore> QuestCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a quest by id.
    pub fn get_quest(&self, quest_id: &str) -> Result<Arc<QuestDefinition>, QuestError> {
        if let Some(quest) = self.cached(quest_id) {
            return Ok(quest);
        }

        let quest = self
            .store
            .run_atomic(|tx| tx.quest(quest_id))
            .map_err(QuestError::from)?
            .ok_or_else(|| QuestError::NotFound(format!("Quest {} not found", quest_id)))?;

        let quest = Arc::new(quest);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(quest_id.to_string(), Arc::clone(&quest));
        }
        Ok(quest)
    }

    /// All quests flagged active. No particular order.
    pub fn list_active_quests(&self) -> Result<Vec<QuestDefinition>, QuestError> {
        let quests = self
            .store
            .run_atomic(|tx| tx.quests())
            .map_err(QuestError::from)?;

        Ok(quests.into_iter().filter(|q| q.is_active).collect())
    }

    /// Validate and store a quest definition.
    ///
    /// Definitions are immutable: publishing an identical definition again
    /// is a no-op, publishing a different one under a taken id is a
    /// `Conflict`.
    pub fn publish_quest(&self, quest: &QuestDefinition) -> Result<(), QuestError> {
        quest.validate().map_err(QuestError::Validation)?;

        let stored = self.store.run_atomic(|tx| match tx.quest(&quest.id)? {
            Some(existing) if existing == *quest => Ok(false),
            Some(_) => Err(QuestError::Conflict(format!(
                "Quest {} is already published with a different definition",
                quest.id
            ))),
            None => {
                tx.put_quest(quest)?;
                Ok(true)
            }
        })?;

        if !stored {
            tracing::debug!("Quest {} already published, nothing to do", quest.id);
            return Ok(());
        }

        tracing::info!(
            "Published quest {} ({} token locations)",
            quest.id,
            quest.total_steps()
        );
        Ok(())
    }

    fn cached(&self, quest_id: &str) -> Option<Arc<QuestDefinition>> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(quest_id).cloned())
    }
}
