//! TrailTales - Quest progression and collection engine
//!
//! Backend core of a location-based treasure hunt game. Players travel to
//! real-world sites, collect tokens in a fixed order once they are inside the
//! token's geofence (optionally confirming with an AR scan), and earn gold
//! and diamonds for completed quests.

pub mod gateway;
pub mod quests;
pub mod rewards;
pub mod storage;

// Re-export commonly used types
pub use gateway::{CollectionGateway, GatewayRequest, GatewayResponse, Operation};
pub use quests::engine::QuestEngine;
pub use quests::error::QuestError;
pub use rewards::ledger::RewardLedger;
pub use storage::config::AppConfig;
pub use storage::{MemoryStore, SqliteStore};
