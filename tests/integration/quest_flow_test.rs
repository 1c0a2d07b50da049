//! Integration tests for the start/collect/complete flow.

use std::sync::Arc;

use trailtales::quests::{
    CollectOutcome, Coordinate, Difficulty, QuestDefinition, QuestError, QuestStatus,
    TokenLocation,
};
use trailtales::storage::MemoryStore;

use super::{engine_with_harbour, t1_location, t2_location, HARBOUR_GOLD};

#[test]
fn test_two_token_scenario() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));

    let started = engine.start_quest("u", "Q").expect("Failed to start quest");
    assert_eq!(started.progress.current_step, 0);
    assert_eq!(started.progress.locked_tokens, vec!["T2"]);
    assert!(started.progress.collected_tokens.is_empty());
    assert_eq!(started.total_steps, 2);
    let first = started.first_step.expect("first step");
    assert_eq!(first.token_id, "T1");
    assert_eq!(first.description, "The old lighthouse");

    let step1 = engine
        .collect_token("u", "Q", "T1", t1_location())
        .expect("T1 should be collectable on site");
    assert_eq!(step1.outcome, CollectOutcome::Collected);
    assert_eq!(step1.progress.current_step, 1);
    assert_eq!(step1.progress.collected_tokens, vec!["T1"]);
    assert!(step1.progress.locked_tokens.is_empty());
    assert_eq!(step1.next_step.as_ref().map(|s| s.token_id.as_str()), Some("T2"));
    assert!(step1.reward.is_none());

    let far = engine.collect_token("u", "Q", "T2", Coordinate::new(0.0, 0.0));
    match far {
        Err(QuestError::OutOfRange { distance, radius }) => {
            assert!(distance > 1_000_000.0);
            assert_eq!(radius, 50.0);
        }
        other => panic!("expected OutOfRange, got {:?}", other),
    }

    let step2 = engine
        .collect_token("u", "Q", "T2", t2_location())
        .expect("T2 should be collectable on site");
    assert_eq!(step2.progress.status, QuestStatus::Completed);
    assert!(step2.progress.completed_at.is_some());
    assert_eq!(step2.progress.current_step, 2);
    assert!(step2.next_step.is_none());
    assert_eq!(step2.reward.map(|r| r.granted.gold), Some(HARBOUR_GOLD));

    let balance = engine.balance("u").unwrap();
    assert_eq!(balance.gold, HARBOUR_GOLD);
    assert_eq!(balance.completed_quests.len(), 1);
    assert_eq!(balance.completed_quests[0].quest_id, "Q");
}

#[test]
fn test_start_in_progress_does_not_mutate() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    let before = engine.get_progress("u", "Q").unwrap();

    let result = engine.start_quest("u", "Q");
    assert!(matches!(result, Err(QuestError::Conflict(_))));
    assert_eq!(engine.get_progress("u", "Q").unwrap(), before);
}

#[test]
fn test_locked_token_is_forbidden_and_does_not_mutate() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    let before = engine.get_progress("u", "Q").unwrap();

    // Standing right on T2 does not help while it is locked
    let result = engine.collect_token("u", "Q", "T2", t2_location());
    assert!(matches!(result, Err(QuestError::Forbidden(_))));
    assert_eq!(engine.get_progress("u", "Q").unwrap(), before);
}

#[test]
fn test_recollecting_is_a_no_op() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    let before = engine.get_progress("u", "Q").unwrap();

    let again = engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    assert_eq!(again.outcome, CollectOutcome::AlreadyCollected);
    assert_eq!(again.progress, before);
    assert_eq!(engine.get_progress("u", "Q").unwrap(), before);
}

#[test]
fn test_recollecting_after_completion_grants_nothing() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    engine.collect_token("u", "Q", "T2", t2_location()).unwrap();

    let again = engine.collect_token("u", "Q", "T2", t2_location()).unwrap();
    assert_eq!(again.outcome, CollectOutcome::AlreadyCollected);
    assert!(again.reward.is_none());
    assert_eq!(engine.balance("u").unwrap().gold, HARBOUR_GOLD);
}

#[test]
fn test_get_progress_missing() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    assert!(matches!(
        engine.get_progress("nobody", "Q"),
        Err(QuestError::NotFound(_))
    ));
}

#[test]
fn test_users_progress_independently() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("alice", "Q").unwrap();
    engine.start_quest("bob", "Q").unwrap();

    engine.collect_token("alice", "Q", "T1", t1_location()).unwrap();

    assert_eq!(engine.get_progress("alice", "Q").unwrap().current_step, 1);
    assert_eq!(engine.get_progress("bob", "Q").unwrap().current_step, 0);
}

#[test]
fn test_user_stats() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));

    let empty = engine.user_stats("u").unwrap();
    assert_eq!(empty.total_coins, 0);
    assert!(empty.active_quests.is_empty());

    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    let active = engine.user_stats("u").unwrap();
    assert_eq!(active.active_quests, vec!["Q"]);
    assert_eq!(active.collection.stories, 1);

    engine.collect_token("u", "Q", "T2", t2_location()).unwrap();
    let done = engine.user_stats("u").unwrap();
    assert!(done.active_quests.is_empty());
    assert_eq!(done.total_coins, HARBOUR_GOLD);
    assert_eq!(done.rewards.gold, HARBOUR_GOLD);
    assert_eq!(done.completed_quests.len(), 1);
    assert_eq!(done.collection.stories, 2);
}

#[test]
fn test_restart_after_abandon_does_not_duplicate_inventory() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    engine.abandon_quest("u", "Q").unwrap();

    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();

    let stats = engine.user_stats("u").unwrap();
    assert_eq!(stats.collection.stories, 1);
    assert_eq!(stats.active_quests, vec!["Q"]);
}

#[test]
fn test_restart_keeps_abandoned_attempt() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();
    engine.collect_token("u", "Q", "T1", t1_location()).unwrap();
    let abandoned = engine.abandon_quest("u", "Q").unwrap();

    let restarted = engine.start_quest("u", "Q").unwrap();
    assert_eq!(restarted.progress.status, QuestStatus::InProgress);

    let history = engine.progress_history("u", "Q").unwrap();
    assert_eq!(history, vec![abandoned]);
    assert_eq!(history[0].status, QuestStatus::Abandoned);
    assert_eq!(history[0].collected_tokens, vec!["T1"]);
}

#[test]
fn test_republishing_different_definition_is_rejected() {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    engine.start_quest("u", "Q").unwrap();

    let shorter = QuestDefinition::new("Q", "Harbour Legends", Difficulty::Medium)
        .with_token(TokenLocation::new("X", Coordinate::new(10.0, 10.0), 50.0));
    assert!(matches!(
        engine.catalog().publish_quest(&shorter),
        Err(QuestError::Conflict(_))
    ));

    // The stored quest still has T1 and T2, so X does not exist
    assert!(matches!(
        engine.collect_token("u", "Q", "X", Coordinate::new(10.0, 10.0)),
        Err(QuestError::NotFound(_))
    ));
    let quest = engine.catalog().get_quest("Q").unwrap();
    let progress = engine.get_progress("u", "Q").unwrap();
    assert_eq!(progress.status, QuestStatus::InProgress);
    assert!(progress.is_consistent(&quest));
}
