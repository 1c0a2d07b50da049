//! Integration tests for the quest flow over the SQLite store.

use std::sync::Arc;

use tempfile::TempDir;
use trailtales::quests::{CollectOutcome, QuestEngine, QuestError, QuestStatus};
use trailtales::storage::{RetryPolicy, SqliteStore};

use super::{engine_with_harbour, t1_location, t2_location, HARBOUR_GOLD};

#[test]
fn test_scenario_in_memory_database() {
    let store = Arc::new(SqliteStore::open_in_memory(RetryPolicy::immediate(3)).unwrap());
    let engine = engine_with_harbour(store);

    engine.start_quest("u", "Q").unwrap();
    assert!(matches!(
        engine.collect_token("u", "Q", "T2", t2_location()),
        Err(QuestError::Forbidden(_))
    ));

    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    let done = engine.collect_token("u", "Q", "T2", t2_location()).unwrap();
    assert!(done.quest_completed());

    let again = engine.collect_token("u", "Q", "T2", t2_location()).unwrap();
    assert_eq!(again.outcome, CollectOutcome::AlreadyCollected);

    let stats = engine.user_stats("u").unwrap();
    assert_eq!(stats.total_coins, HARBOUR_GOLD);
    assert_eq!(stats.completed_quests.len(), 1);
    assert_eq!(stats.collection.stories, 2);
}

#[test]
fn test_progress_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("quests.db");

    {
        let store = Arc::new(SqliteStore::open(&db_path, RetryPolicy::immediate(3)).unwrap());
        let engine = engine_with_harbour(store);
        engine.start_quest("u", "Q").unwrap();
        engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    }

    let store = Arc::new(SqliteStore::open(&db_path, RetryPolicy::immediate(3)).unwrap());
    let engine = QuestEngine::with_defaults(store);

    let progress = engine.get_progress("u", "Q").unwrap();
    assert_eq!(progress.status, QuestStatus::InProgress);
    assert_eq!(progress.collected_tokens, vec!["T1"]);
    assert!(progress.locked_tokens.is_empty());

    // The definition was persisted too, so the quest can be finished
    let done = engine.collect_token("u", "Q", "T2", t2_location()).unwrap();
    assert_eq!(done.reward.map(|r| r.granted.gold), Some(HARBOUR_GOLD));
    assert_eq!(engine.balance("u").unwrap().gold, HARBOUR_GOLD);
}

#[test]
fn test_failed_collection_leaves_no_partial_writes() {
    let store = Arc::new(SqliteStore::open_in_memory(RetryPolicy::immediate(3)).unwrap());
    let engine = engine_with_harbour(store);
    engine.start_quest("u", "Q").unwrap();
    let before = engine.get_progress("u", "Q").unwrap();

    let bad_scan = engine.collect_token_via_scan("u", "Q", "T1", t1_location(), "market");
    assert!(matches!(bad_scan, Err(QuestError::InvalidScan(_))));

    assert_eq!(engine.get_progress("u", "Q").unwrap(), before);
    assert_eq!(engine.user_stats("u").unwrap().collection.stories, 0);
}

#[test]
fn test_abandoned_attempt_is_archived() {
    let store = Arc::new(SqliteStore::open_in_memory(RetryPolicy::immediate(3)).unwrap());
    let engine = engine_with_harbour(store);
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    engine.abandon_quest("u", "Q").unwrap();
    engine.start_quest("u", "Q").unwrap();

    let history = engine.progress_history("u", "Q").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, QuestStatus::Abandoned);
    assert_eq!(history[0].collected_tokens, vec!["T1"]);
    assert_eq!(
        engine.get_progress("u", "Q").unwrap().status,
        QuestStatus::InProgress
    );
}

