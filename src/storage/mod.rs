//! Storage module: transactional document stores and configuration.

pub mod config;
pub mod database;
pub mod memory;
pub mod schema;
pub mod store;

pub use config::{AppConfig, ConfigError, RetrySettings, RewardSettings};
pub use database::SqliteStore;
pub use memory::MemoryStore;
pub use store::{DocumentStore, DocumentTransaction, RetryPolicy, StoreError};
