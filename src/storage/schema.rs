//! Database schema definitions.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Quest definitions, stored as JSON documents
CREATE TABLE IF NOT EXISTS quests (
    id TEXT PRIMARY KEY,
    is_active INTEGER NOT NULL DEFAULT 1,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One progress record per user and quest
CREATE TABLE IF NOT EXISTS quest_progress (
    user_id TEXT NOT NULL,
    quest_id TEXT NOT NULL,
    status TEXT NOT NULL,
    document TEXT NOT NULL,
    started_at TEXT NOT NULL,
    PRIMARY KEY (user_id, quest_id)
);

CREATE INDEX IF NOT EXISTS idx_quest_progress_status ON quest_progress(user_id, status);

-- Earlier attempts replaced by a restart
CREATE TABLE IF NOT EXISTS quest_progress_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    quest_id TEXT NOT NULL,
    status TEXT NOT NULL,
    document TEXT NOT NULL,
    archived_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quest_progress_history_user
    ON quest_progress_history(user_id, quest_id);

-- Reward balances, only ever incremented
CREATE TABLE IF NOT EXISTS reward_balances (
    user_id TEXT PRIMARY KEY,
    gold INTEGER NOT NULL DEFAULT 0 CHECK (gold >= 0),
    diamonds INTEGER NOT NULL DEFAULT 0 CHECK (diamonds >= 0),
    updated_at TEXT NOT NULL
);

-- Completed quest history
CREATE TABLE IF NOT EXISTS completed_quests (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES reward_balances(user_id),
    quest_id TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    gold_granted INTEGER NOT NULL,
    diamonds_granted INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_completed_quests_user ON completed_quests(user_id);

-- Collected item inventory
CREATE TABLE IF NOT EXISTS collected_items (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    quest_id TEXT NOT NULL,
    token_id TEXT NOT NULL,
    collectible TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    UNIQUE (user_id, quest_id, token_id)
);
"#;

/// Schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
