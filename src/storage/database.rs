//! SQLite-backed document store using rusqlite.
//!
//! Transactions are opened with `BEGIN IMMEDIATE`, so the write lock is taken
//! up front. Busy or locked errors from another connection surface as write
//! conflicts and go through the retry policy.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, Connection, OptionalExtension, Result as SqliteResult, TransactionBehavior,
};
use uuid::Uuid;

use super::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use super::store::{DocumentStore, DocumentTransaction, RetryPolicy, StoreError};
use crate::quests::types::{CollectibleKind, QuestDefinition, QuestProgress};
use crate::rewards::types::{
    BalanceUpdate, CollectedItem, CompletedQuest, RewardBalance, RewardDescriptor,
};

/// Document store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path, retry: RetryPolicy) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            retry,
        };
        store.initialize()?;

        tracing::info!("Opened quest database at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(retry: RetryPolicy) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            retry,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

        conn.execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        let current_version = Self::schema_version(&conn)?;
        if current_version < CURRENT_VERSION {
            Self::migrate(&conn, current_version)?;
        }

        Ok(())
    }

    fn schema_version(conn: &Connection) -> Result<i32, StoreError> {
        let result: SqliteResult<i32> = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn migrate(conn: &Connection, from_version: i32) -> Result<(), StoreError> {
        if from_version < 1 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                [CURRENT_VERSION],
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn run_atomic<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnMut(&mut dyn DocumentTransaction) -> Result<T, E>,
    {
        self.retry.execute(|| {
            let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let outcome = {
                let mut handle = SqliteTransaction { conn: &tx };
                op(&mut handle)
            };

            match outcome {
                Ok(value) => {
                    tx.commit()?;
                    Ok(Ok(value))
                }
                Err(e) => {
                    // Dropping the transaction rolls it back
                    drop(tx);
                    Ok(Err(e))
                }
            }
        })
    }
}

/// Operations on an open SQLite transaction.
struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl SqliteTransaction<'_> {
    fn load_documents<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(serde_json::from_str(&row?)?);
        }
        Ok(documents)
    }

    fn completed_quests(&self, user_id: &str) -> Result<Vec<CompletedQuest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT quest_id, completed_at, gold_granted, diamonds_granted
             FROM completed_quests WHERE user_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (quest_id, completed_at, gold, diamonds) = row?;
            entries.push(CompletedQuest {
                quest_id,
                completed_at: parse_timestamp(&completed_at)?,
                rewards_granted: RewardDescriptor::new(
                    from_sql_int(gold)?,
                    from_sql_int(diamonds)?,
                ),
            });
        }
        Ok(entries)
    }
}

impl DocumentTransaction for SqliteTransaction<'_> {
    fn quest(&mut self, quest_id: &str) -> Result<Option<QuestDefinition>, StoreError> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM quests WHERE id = ?1",
                params![quest_id],
                |row| row.get(0),
            )
            .optional()?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(StoreError::from))
            .transpose()
    }

    fn quests(&mut self) -> Result<Vec<QuestDefinition>, StoreError> {
        self.load_documents("SELECT document FROM quests ORDER BY id", &[])
    }

    fn put_quest(&mut self, quest: &QuestDefinition) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO quests (id, is_active, document, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                is_active = excluded.is_active,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                quest.id,
                quest.is_active,
                serde_json::to_string(quest)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn progress(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Option<QuestProgress>, StoreError> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM quest_progress WHERE user_id = ?1 AND quest_id = ?2",
                params![user_id, quest_id],
                |row| row.get(0),
            )
            .optional()?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(StoreError::from))
            .transpose()
    }

    fn progress_for_user(&mut self, user_id: &str) -> Result<Vec<QuestProgress>, StoreError> {
        self.load_documents(
            "SELECT document FROM quest_progress WHERE user_id = ?1 ORDER BY started_at ASC",
            &[&user_id],
        )
    }

    fn put_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO quest_progress (user_id, quest_id, status, document, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, quest_id) DO UPDATE SET
                status = excluded.status,
                document = excluded.document,
                started_at = excluded.started_at",
            params![
                progress.user_id,
                progress.quest_id,
                progress.status.as_str(),
                serde_json::to_string(progress)?,
                progress.started_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn archive_progress(&mut self, progress: &QuestProgress) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO quest_progress_history (user_id, quest_id, status, document, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                progress.user_id,
                progress.quest_id,
                progress.status.as_str(),
                serde_json::to_string(progress)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn progress_history(
        &mut self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Vec<QuestProgress>, StoreError> {
        self.load_documents(
            "SELECT document FROM quest_progress_history
             WHERE user_id = ?1 AND quest_id = ?2 ORDER BY seq ASC",
            &[&user_id, &quest_id],
        )
    }

    fn balance(&mut self, user_id: &str) -> Result<Option<RewardBalance>, StoreError> {
        let row: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT gold, diamonds FROM reward_balances WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((gold, diamonds)) = row else {
            return Ok(None);
        };

        Ok(Some(RewardBalance {
            user_id: user_id.to_string(),
            gold: from_sql_int(gold)?,
            diamonds: from_sql_int(diamonds)?,
            completed_quests: self.completed_quests(user_id)?,
        }))
    }

    fn apply_balance(&mut self, user_id: &str, update: &BalanceUpdate) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        match update {
            BalanceUpdate::Increment { gold, diamonds } => {
                self.conn.execute(
                    "INSERT INTO reward_balances (user_id, gold, diamonds, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                        gold = gold + excluded.gold,
                        diamonds = diamonds + excluded.diamonds,
                        updated_at = excluded.updated_at",
                    params![user_id, to_sql_int(*gold)?, to_sql_int(*diamonds)?, now],
                )?;
            }
            BalanceUpdate::AppendCompletion(entry) => {
                self.conn.execute(
                    "INSERT OR IGNORE INTO reward_balances (user_id, gold, diamonds, updated_at)
                     VALUES (?1, 0, 0, ?2)",
                    params![user_id, now],
                )?;
                self.conn.execute(
                    "INSERT INTO completed_quests
                     (user_id, quest_id, completed_at, gold_granted, diamonds_granted)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        user_id,
                        entry.quest_id,
                        entry.completed_at.to_rfc3339(),
                        to_sql_int(entry.rewards_granted.gold)?,
                        to_sql_int(entry.rewards_granted.diamonds)?,
                    ],
                )?;
            }
        }

        Ok(())
    }

    fn insert_item(&mut self, item: &CollectedItem) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO collected_items
             (id, user_id, quest_id, token_id, collectible, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id.to_string(),
                item.user_id,
                item.quest_id,
                item.token_id,
                collectible_name(item.collectible),
                item.collected_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn items_for_user(&mut self, user_id: &str) -> Result<Vec<CollectedItem>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, quest_id, token_id, collectible, collected_at
             FROM collected_items WHERE user_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, quest_id, token_id, collectible, collected_at) = row?;
            items.push(CollectedItem {
                id: Uuid::parse_str(&id)
                    .map_err(|e| StoreError::Corrupt(format!("Invalid item id: {}", e)))?,
                user_id: user_id.to_string(),
                quest_id,
                token_id,
                collectible: parse_collectible(&collectible)?,
                collected_at: parse_timestamp(&collected_at)?,
            });
        }
        Ok(items)
    }
}

fn collectible_name(kind: CollectibleKind) -> &'static str {
    match kind {
        CollectibleKind::Story => "story",
        CollectibleKind::Collectible => "collectible",
    }
}

fn parse_collectible(name: &str) -> Result<CollectibleKind, StoreError> {
    match name {
        "story" => Ok(CollectibleKind::Story),
        "collectible" => Ok(CollectibleKind::Collectible),
        other => Err(StoreError::Corrupt(format!(
            "Unknown collectible kind: {}",
            other
        ))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("Invalid timestamp {}: {}", value, e)))
}

fn to_sql_int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("Amount too large: {}", value)))
}

fn from_sql_int(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("Negative amount: {}", value)))
}
