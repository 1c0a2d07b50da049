//! Reward balance and inventory types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quests::types::{CollectibleKind, TokenLocation};

/// Currency amounts granted for finishing a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardDescriptor {
    /// Gold coins
    pub gold: u64,
    /// Diamonds
    pub diamonds: u64,
}

impl RewardDescriptor {
    /// Create a reward descriptor.
    pub fn new(gold: u64, diamonds: u64) -> Self {
        Self { gold, diamonds }
    }

    /// Whether this grants nothing.
    pub fn is_empty(&self) -> bool {
        self.gold == 0 && self.diamonds == 0
    }
}

/// History entry for a finished quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedQuest {
    pub quest_id: String,
    pub completed_at: DateTime<Utc>,
    pub rewards_granted: RewardDescriptor,
}

/// A user's currency balances and completed quest history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBalance {
    pub user_id: String,
    pub gold: u64,
    pub diamonds: u64,
    pub completed_quests: Vec<CompletedQuest>,
}

impl RewardBalance {
    /// Zero balance for a user with no history.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            gold: 0,
            diamonds: 0,
            completed_quests: Vec::new(),
        }
    }

    /// Apply a single additive update.
    pub fn apply(&mut self, update: &BalanceUpdate) {
        match update {
            BalanceUpdate::Increment { gold, diamonds } => {
                self.gold = self.gold.saturating_add(*gold);
                self.diamonds = self.diamonds.saturating_add(*diamonds);
            }
            BalanceUpdate::AppendCompletion(entry) => {
                self.completed_quests.push(entry.clone());
            }
        }
    }
}

/// The only mutations a [`RewardBalance`] accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceUpdate {
    /// Add to the gold and diamond balances
    Increment { gold: u64, diamonds: u64 },
    /// Append to the completed quest history
    AppendCompletion(CompletedQuest),
}

/// Result of a quest completion grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrant {
    pub user_id: String,
    pub quest_id: String,
    pub granted: RewardDescriptor,
    pub completed_at: DateTime<Utc>,
}

/// Inventory entry for a collected token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedItem {
    pub id: Uuid,
    pub user_id: String,
    pub quest_id: String,
    pub token_id: String,
    pub collectible: CollectibleKind,
    pub collected_at: DateTime<Utc>,
}

impl CollectedItem {
    /// Create an inventory entry for a token collected now.
    pub fn new(
        user_id: &str,
        quest_id: &str,
        token: &TokenLocation,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            quest_id: quest_id.to_string(),
            token_id: token.id.clone(),
            collectible: token.reward.collectible,
            collected_at,
        }
    }

    /// Same quest/token pair as another entry.
    pub fn same_token(&self, other: &CollectedItem) -> bool {
        self.quest_id == other.quest_id && self.token_id == other.token_id
    }
}

/// Collected item counts by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub stories: u32,
    pub collectibles: u32,
}

impl CollectionSummary {
    /// Count items by kind.
    pub fn from_items(items: &[CollectedItem]) -> Self {
        items.iter().fold(Self::default(), |mut acc, item| {
            match item.collectible {
                CollectibleKind::Story => acc.stories += 1,
                CollectibleKind::Collectible => acc.collectibles += 1,
            }
            acc
        })
    }
}

/// Aggregate view returned by `getUserStats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub total_coins: u64,
    pub completed_quests: Vec<CompletedQuest>,
    pub active_quests: Vec<String>,
    pub rewards: RewardDescriptor,
    pub collection: CollectionSummary,
}
