//! In-memory document store with optimistic concurrency.
//!
//! Each document carries a version. A transaction remembers the version of
//! every document it reads and buffers its writes; at commit the versions
//! are compared under the lock and any mismatch aborts the attempt with a
//! write conflict.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::store::{DocumentStore, DocumentTransaction, RetryPolicy, StoreError};
use crate::quests::types::{QuestDefinition, QuestProgress};
use crate::rewards::types::{BalanceUpdate, CollectedItem, RewardBalance};

type ProgressKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DocKey {
    Quest(String),
    Progress(String, String),
    History(String, String),
    Balance(String),
    Items(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    versions: HashMap<DocKey, u64>,
    quests: HashMap<String, QuestDefinition>,
    progress: HashMap<ProgressKey, QuestProgress>,
    history: HashMap<ProgressKey, Vec<QuestProgress>>,
    balances: HashMap<String, RewardBalance>,
    items: HashMap<String, Vec<CollectedItem>>,
}

impl MemoryState {
    fn version(&self, key: &DocKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: DocKey) {
        *self.versions.entry(key).or_insert(0) += 1;
    }
}

/// In-memory [`DocumentStore`] for tests and development.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    retry: RetryPolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            retry,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn run_atomic<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnMut(&mut dyn DocumentTransaction) -> Result<T, E>,
    {
        self.retry.execute(|| {
            let mut tx = MemoryTransaction::new(self);
            match op(&mut tx) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(Ok(value))
                }
                // Buffered writes are dropped with the transaction
                Err(e) => Ok(Err(e)),
            }
        })
    }
}

/// Buffered transaction over a [`MemoryStore`].
struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    reads: HashMap<DocKey, u64>,
    quests: HashMap<String, QuestDefinition>,
    progress: HashMap<ProgressKey, QuestProgress>,
    history: HashMap<ProgressKey, Vec<QuestProgress>>,
    balances: HashMap<String, RewardBalance>,
    items: HashMap<String, Vec<CollectedItem>>,
}

impl<'s> MemoryTransaction<'s> {
    fn new(store: &'s MemoryStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            quests: HashMap::new(),
            progress: HashMap::new(),
            history: HashMap::new(),
            balances: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn observe(reads: &mut HashMap<DocKey, u64>, state: &MemoryState, key: DocKey) {
        let version = state.version(&key);
        reads.entry(key).or_insert(version);
    }

    fn load_items(&mut self, user_id: &str) -> Result<Vec<CollectedItem>, StoreError> {
        if let Some(items) = self.items.get(user_id) {
            return Ok(items.clone());
        }
        let state = self.store.lock()?;
        Self::observe(&mut self.reads, &state, DocKey::Items(user_id.to_string()));
        Ok(state.items.get(user_id).cloned().unwrap_or_default())
    }

    fn load_history(&mut self, key: &ProgressKey) -> Result<Vec<QuestProgress>, StoreError> {
        if let Some(history) = self.history.get(key) {
            return Ok(history.clone());
        }
        let state = self.store.lock()?;
        Self::observe(
            &mut self.reads,
            &state,
            DocKey::History(key.0.clone(), key.1.clone()),
        );
        Ok(state.history.get(key).cloned().unwrap_or_default())
    }

    fn commit(self) -> Result<(), StoreError> {
        let mut state = self.store.lock()?;

        if let Some((key, _)) = self
            .reads
            .iter()
            .find(|(key, version)| state.version(key) != **version)
        {
            tracing::debug!("Stale read of {:?}, aborting commit", key);
            return Err(StoreError::WriteConflict);
        }

        for (id, quest) in self.quests {
            state.bump(DocKey::Quest(id.clone()));
            state.quests.insert(id, quest);
        }
        for ((user_id, quest_id), progress) in self.progress {
            state.bump(DocKey::Progress(user_id.clone(), quest_id.clone()));
            state.progress.insert((user_id, quest_id), progress);
        }
        for ((user_id, quest_id), history) in self.history {
            state.bump(DocKey::History(user_id.clone(), quest_id.clone()));
            state.history.insert((user_id, quest_id), history);
        }
        for (user_id, balance) in self.balances {
            state.bump(DocKey::Balance(user_id.clone()));
            state.balances.insert(user_id, balance);
        }
        for (user_id, items) in self.items {
            state.bump(DocKey::Items(user_id.clone()));
            state.items.insert(user_id, items);
        }

        Ok(())
    }
}

impl DocumentTransaction for MemoryTransaction<'_> {
    fn quest(&mut self, quest_id: &str) -> Result<Option<QuestDefinition>, StoreError> {
        if let Some(quest) = self.quests.get(quest_id) {
            return Ok(Some(quest.clone()));
        }
        let state = self.store.lock()?;
        Self::observe(&mut self.reads, &state, DocKey::Quest(quest_id.to_string()));
        Ok(state.quests.get(quest_id).cloned())
    }

    fn quests(&mut self) -> Result<Vec<QuestDefinition>, StoreError> {
        let state = self.store.lock()?;
        let mut merged: HashMap<String, QuestDefinition> = HashMap::new();
        for (id, quest) in &state.quests {
            Self::observe(&mut self.reads, &state, DocKey::Quest(id.clone()));
            merged.insert(id.clone(), quest.clone());
        }
        for (id, quest) in &self.quests {
            merged.insert(id.clone(), quest.clone());
        }
        Ok(merged.into_values().collect())
    }

    fn put_quest(&mut self, quest: &QuestDefinition) -> Result<(), StoreError> {
        self.quests.insert(quest.id.clone(), quest.clone());
        Ok(())
    }

    fn progress(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Option<QuestProgress>, StoreError> {
        let key = (user_id.to_string(), quest_id.to_string());
        if let Some(progress) = self.progress.get(&key) {
            return Ok(Some(progress.clone()));
        }
        let state = self.store.lock()?;
        Self::observe(
            &mut self.reads,
            &state,
            DocKey::Progress(key.0.clone(), key.1.clone()),
        );
        Ok(state.progress.get(&key).cloned())
    }

    fn progress_for_user(&mut self, user_id: &str) -> Result<Vec<QuestProgress>, StoreError> {
        let state = self.store.lock()?;
        let mut merged: HashMap<String, QuestProgress> = HashMap::new();
        for ((owner, quest_id), progress) in &state.progress {
            if owner == user_id {
                Self::observe(
                    &mut self.reads,
                    &state,
                    DocKey::Progress(owner.clone(), quest_id.clone()),
                );
                merged.insert(quest_id.clone(), progress.clone());
            }
        }
        for ((owner, quest_id), progress) in &self.progress {
            if owner == user_id {
                merged.insert(quest_id.clone(), progress.clone());
            }
        }

        let mut records: Vec<QuestProgress> = merged.into_values().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }

    fn put_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError> {
        self.progress.insert(
            (progress.user_id.clone(), progress.quest_id.clone()),
            progress.clone(),
        );
        Ok(())
    }

    fn archive_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError> {
        let key = (progress.user_id.clone(), progress.quest_id.clone());
        let mut history = self.load_history(&key)?;
        history.push(progress.clone());
        self.history.insert(key, history);
        Ok(())
    }

    fn progress_history(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Vec<QuestProgress>, StoreError> {
        self.load_history(&(user_id.to_string(), quest_id.to_string()))
    }

    fn balance(&mut self, user_id: &str) -> Result<Option<RewardBalance>, StoreError> {
        if let Some(balance) = self.balances.get(user_id) {
            return Ok(Some(balance.clone()));
        }
        let state = self.store.lock()?;
        Self::observe(&mut self.reads, &state, DocKey::Balance(user_id.to_string()));
        Ok(state.balances.get(user_id).cloned())
    }

    fn apply_balance(&mut self, user_id: &str, update: &BalanceUpdate) -> Result<(), StoreError> {
        let mut balance = self
            .balance(user_id)?
            .unwrap_or_else(|| RewardBalance::empty(user_id));
        balance.apply(update);
        self.balances.insert(user_id.to_string(), balance);
        Ok(())
    }

    fn insert_item(&mut self, item: &CollectedItem) -> Result<bool, StoreError> {
        let mut items = self.load_items(&item.user_id)?;
        if items.iter().any(|existing| existing.same_token(item)) {
            return Ok(false);
        }
        items.push(item.clone());
        self.items.insert(item.user_id.clone(), items);
        Ok(true)
    }

    fn items_for_user(&mut self, user_id: &str) -> Result<Vec<CollectedItem>, StoreError> {
        self.load_items(user_id)
    }
}
