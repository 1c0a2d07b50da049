//! Quest module.
//!
//! Quest definitions, per-user progress and the progression engine:
//! - Geofence distance checks
//! - Sequential token unlocking
//! - Location and AR scan collection

pub mod catalog;
pub mod engine;
pub mod error;
pub mod geo;
pub mod scan;
pub mod types;

// Re-exports for convenience
pub use catalog::QuestCatalog;
pub use engine::QuestEngine;
pub use error::QuestError;
pub use geo::{distance_meters, Coordinate};
pub use scan::{MarkerMatchValidator, ScanValidator};
pub use types::{
    ArMarker, CollectOutcome, CollectibleKind, CollectionResult, Difficulty, QuestDefinition,
    QuestProgress, QuestStatus, StartedQuest, StepView, TokenKind, TokenLocation, TokenReward,
};
