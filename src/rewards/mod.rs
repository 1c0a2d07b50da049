//! Rewards module.
//!
//! Currency balances, completed quest history and the collected item
//! inventory, all updated additively inside quest transactions.

pub mod ledger;
pub mod types;

// Re-exports for convenience
pub use ledger::RewardLedger;
pub use types::{
    BalanceUpdate, CollectedItem, CollectionSummary, CompletedQuest, RewardBalance,
    RewardDescriptor, RewardGrant, UserStats,
};
