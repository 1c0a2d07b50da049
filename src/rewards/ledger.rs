//! Reward ledger.
//!
//! All writes happen inside the caller's transaction so that a balance change
//! commits together with the progress update that triggered it. Balances are
//! only ever changed through additive [`BalanceUpdate`]s.

use chrono::{DateTime, Utc};

use super::types::{
    BalanceUpdate, CollectedItem, CollectionSummary, CompletedQuest, RewardBalance,
    RewardDescriptor, RewardGrant, UserStats,
};
use crate::quests::types::{QuestDefinition, QuestStatus};
use crate::storage::config::RewardSettings;
use crate::storage::store::{DocumentTransaction, StoreError};

/// Applies quest rewards and inventory updates.
#[derive(Debug, Clone, Default)]
pub struct RewardLedger {
    defaults: RewardSettings,
}

impl RewardLedger {
    pub fn new(defaults: RewardSettings) -> Self {
        Self { defaults }
    }

    /// Completion reward for a quest: its own, or the difficulty default.
    pub fn reward_for(&self, quest: &QuestDefinition) -> RewardDescriptor {
        quest
            .rewards
            .unwrap_or_else(|| self.defaults.for_difficulty(quest.difficulty))
    }

    /// Grant the completion reward of `quest` to a user.
    pub fn grant(
        &self,
        tx: &mut dyn DocumentTransaction,
        user_id: &str,
        quest: &QuestDefinition,
        completed_at: DateTime<Utc>,
    ) -> Result<RewardGrant, StoreError> {
        let reward = self.reward_for(quest);

        if !reward.is_empty() {
            tx.apply_balance(
                user_id,
                &BalanceUpdate::Increment {
                    gold: reward.gold,
                    diamonds: reward.diamonds,
                },
            )?;
        }
        tx.apply_balance(
            user_id,
            &BalanceUpdate::AppendCompletion(CompletedQuest {
                quest_id: quest.id.clone(),
                completed_at,
                rewards_granted: reward,
            }),
        )?;

        tracing::info!(
            "Granted {} gold and {} diamonds to {} for quest {}",
            reward.gold,
            reward.diamonds,
            user_id,
            quest.id
        );

        Ok(RewardGrant {
            user_id: user_id.to_string(),
            quest_id: quest.id.clone(),
            granted: reward,
            completed_at,
        })
    }

    /// Add a collected token to the inventory and credit its gold.
    ///
    /// Gold is credited only the first time a user holds the token, so
    /// restarting an abandoned quest does not pay out twice.
    pub fn record_item(
        &self,
        tx: &mut dyn DocumentTransaction,
        item: &CollectedItem,
        gold: u64,
    ) -> Result<bool, StoreError> {
        let added = tx.insert_item(item)?;

        if added && gold > 0 {
            tx.apply_balance(&item.user_id, &BalanceUpdate::Increment { gold, diamonds: 0 })?;
        }

        Ok(added)
    }

    /// Current balance, zero if the user has none yet.
    pub fn balance(
        &self,
        tx: &mut dyn DocumentTransaction,
        user_id: &str,
    ) -> Result<RewardBalance, StoreError> {
        Ok(tx
            .balance(user_id)?
            .unwrap_or_else(|| RewardBalance::empty(user_id)))
    }

    /// Aggregate stats for a user; empty defaults when nothing is recorded.
    pub fn user_stats(
        &self,
        tx: &mut dyn DocumentTransaction,
        user_id: &str,
    ) -> Result<UserStats, StoreError> {
        let balance = self.balance(tx, user_id)?;
        let active_quests = tx
            .progress_for_user(user_id)?
            .into_iter()
            .filter(|p| p.status == QuestStatus::InProgress)
            .map(|p| p.quest_id)
            .collect();
        let items = tx.items_for_user(user_id)?;

        Ok(UserStats {
            user_id: user_id.to_string(),
            total_coins: balance.gold,
            completed_quests: balance.completed_quests,
            active_quests,
            rewards: RewardDescriptor::new(balance.gold, balance.diamonds),
            collection: CollectionSummary::from_items(&items),
        })
    }
}
