//! Unit tests for progress record invariants across a full quest.

use chrono::Utc;
use trailtales::quests::{
    Coordinate, Difficulty, QuestDefinition, QuestProgress, QuestStatus, TokenLocation,
};

fn five_stop_quest() -> QuestDefinition {
    (0..5).fold(
        QuestDefinition::new("walk", "City Walk", Difficulty::Medium),
        |quest, i| {
            quest.with_token(TokenLocation::new(
                &format!("stop-{}", i),
                Coordinate::new(50.0 + i as f64 * 0.001, 4.0),
                40.0,
            ))
        },
    )
}

#[test]
fn test_invariants_hold_through_every_step() {
    let quest = five_stop_quest();
    let mut progress = QuestProgress::start("rider", &quest, Utc::now());
    assert!(progress.is_consistent(&quest));

    for (i, token) in quest.token_locations.iter().enumerate() {
        assert!(!progress.is_locked(&token.id), "{} should be unlocked", token.id);
        progress.record_collection(&quest, &token.id);

        assert!(progress.is_consistent(&quest));
        assert_eq!(progress.current_step as usize, i + 1);
        let still_locked = quest.total_steps() - (i + 2).min(quest.total_steps());
        assert_eq!(progress.locked_tokens.len(), still_locked);
    }

    assert!(progress.is_finished(&quest));
    progress.complete(Utc::now());
    assert_eq!(progress.status, QuestStatus::Completed);
    assert!(progress.completed_at.is_some());
}

#[test]
fn test_only_one_token_unlocked_at_a_time() {
    let quest = five_stop_quest();
    let mut progress = QuestProgress::start("rider", &quest, Utc::now());

    progress.record_collection(&quest, "stop-0");
    let unlocked: Vec<_> = quest
        .token_locations
        .iter()
        .filter(|t| !progress.has_collected(&t.id) && !progress.is_locked(&t.id))
        .map(|t| t.id.as_str())
        .collect();

    assert_eq!(unlocked, vec!["stop-1"]);
}

#[test]
fn test_collection_order_is_preserved() {
    let quest = five_stop_quest();
    let mut progress = QuestProgress::start("rider", &quest, Utc::now());

    progress.record_collection(&quest, "stop-0");
    progress.record_collection(&quest, "stop-1");
    progress.record_collection(&quest, "stop-2");

    assert_eq!(progress.collected_tokens, vec!["stop-0", "stop-1", "stop-2"]);
    let (index, next) = progress.next_token(&quest).expect("two stops remain");
    assert_eq!(index, 3);
    assert_eq!(next.id, "stop-3");
}
