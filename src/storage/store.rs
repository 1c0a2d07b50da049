//! Transactional document store abstraction.
//!
//! Every read-modify-write of progress or balances goes through
//! [`DocumentStore::run_atomic`]. Implementations commit all writes of a
//! transaction or none of them, and report write conflicts so the shared
//! [`RetryPolicy`] can rerun the transaction.

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::quests::types::{QuestDefinition, QuestProgress};
use crate::rewards::types::{BalanceUpdate, CollectedItem, RewardBalance};
use crate::storage::config::RetrySettings;

/// Operations available inside a transaction.
pub trait DocumentTransaction {
    /// Get a quest definition by id.
    fn quest(&mut self, quest_id: &str) -> Result<Option<QuestDefinition>, StoreError>;

    /// All quest definitions.
    fn quests(&mut self) -> Result<Vec<QuestDefinition>, StoreError>;

    /// Insert or replace a quest definition.
    fn put_quest(&mut self, quest: &QuestDefinition) -> Result<(), StoreError>;

    /// Get the progress record for a user and quest.
    fn progress(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Option<QuestProgress>, StoreError>;

    /// All progress records of a user.
    fn progress_for_user(&mut self, user_id: &str) -> Result<Vec<QuestProgress>, StoreError>;

    /// Insert or replace a progress record.
    fn put_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError>;

    /// Append a finished attempt to the user's progress history.
    fn archive_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError>;

    /// Archived attempts of a user on a quest, oldest first.
    fn progress_history(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Vec<QuestProgress>, StoreError>;

    /// Get a user's reward balance.
    fn balance(&mut self, user_id: &str) -> Result<Option<RewardBalance>, StoreError>;

    /// Apply an additive balance update, creating the balance if needed.
    fn apply_balance(&mut self, user_id: &str, update: &BalanceUpdate) -> Result<(), StoreError>;

    /// Add an inventory entry. Returns false if the user already holds
    /// this quest/token pair.
    fn insert_item(&mut self, item: &CollectedItem) -> Result<bool, StoreError>;

    /// A user's inventory, oldest first.
    fn items_for_user(&mut self, user_id: &str) -> Result<Vec<CollectedItem>, StoreError>;
}

/// A store that runs closures as atomic transactions.
pub trait DocumentStore: Send + Sync {
    /// Run `op` inside a transaction.
    ///
    /// If `op` returns `Err`, nothing it wrote is kept. Write conflicts at
    /// commit are retried per the store's retry policy; once retries are
    /// exhausted the call fails with [`StoreError::RetriesExhausted`].
    fn run_atomic<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnMut(&mut dyn DocumentTransaction) -> Result<T, E>;
}

/// Bounded retry with exponential backoff for conflicting transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Run `attempt` until it returns something other than a write conflict.
    ///
    /// The outer result of `attempt` carries store failures; the inner one is
    /// the transaction's own outcome and is returned as is.
    pub fn execute<T, E, F>(&self, mut attempt: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnMut() -> Result<Result<T, E>, StoreError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;

        for n in 1..=max_attempts {
            match attempt() {
                Ok(outcome) => return outcome,
                Err(StoreError::WriteConflict) => {
                    tracing::debug!("Write conflict on attempt {}/{}", n, max_attempts);
                    if n < max_attempts && !backoff.is_zero() {
                        thread::sleep(backoff);
                        backoff = (backoff * 2).min(self.max_backoff);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            "Transaction abandoned after {} conflicting attempts",
            max_attempts
        );
        Err(StoreError::RetriesExhausted {
            attempts: max_attempts,
        }
        .into())
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write conflict")]
    WriteConflict,

    #[error("Transaction could not commit after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::WriteConflict
            }
            _ => StoreError::Database(err),
        }
    }
}
