//! Integration tests for request dispatch and status mapping.

use std::sync::Arc;

use trailtales::gateway::{
    CollectionGateway, GatewayRequest, Operation, StaticIdentityResolver, STATUS_BAD_REQUEST,
    STATUS_CONFLICT, STATUS_CREATED, STATUS_FORBIDDEN, STATUS_NOT_FOUND, STATUS_OK,
    STATUS_UNAUTHORIZED, STATUS_UNPROCESSABLE,
};
use trailtales::quests::{Coordinate, MarkerMatchValidator};
use trailtales::storage::MemoryStore;

use super::{engine_with_harbour, t1_location, t2_location, HARBOUR_GOLD};

type TestGateway = CollectionGateway<MemoryStore, MarkerMatchValidator, StaticIdentityResolver>;

fn gateway() -> TestGateway {
    let engine = engine_with_harbour(Arc::new(MemoryStore::new()));
    let identity = StaticIdentityResolver::default()
        .with_user("alice-token", "alice")
        .with_user("bob-token", "bob");
    CollectionGateway::new(engine, identity)
}

fn as_alice(operation: Operation) -> GatewayRequest {
    GatewayRequest::new("Bearer alice-token", operation)
}

fn start(quest_id: &str) -> Operation {
    Operation::StartQuest {
        quest_id: quest_id.to_string(),
    }
}

fn collect(token_id: &str, at: Coordinate) -> Operation {
    Operation::CollectToken {
        quest_id: "Q".to_string(),
        token_id: token_id.to_string(),
        user_location: at,
    }
}

fn scan(token_id: &str, at: Coordinate, payload: &str) -> Operation {
    Operation::CollectTokenViaScan {
        quest_id: "Q".to_string(),
        token_id: token_id.to_string(),
        user_location: at,
        scan_payload: payload.to_string(),
    }
}

#[test]
fn test_unknown_credential_is_unauthorized() {
    let gateway = gateway();
    let response = gateway.handle(&GatewayRequest::new("Bearer stolen", start("Q")));

    assert_eq!(response.status, STATUS_UNAUTHORIZED);
    assert_eq!(response.body["error"], "unauthorized");
    // Nothing was started on anyone's behalf
    assert!(gateway.engine().get_progress("alice", "Q").is_err());
}

#[test]
fn test_start_returns_created_with_first_step() {
    let gateway = gateway();
    let response = gateway.handle(&as_alice(start("Q")));

    assert_eq!(response.status, STATUS_CREATED);
    assert!(response.is_success());
    assert_eq!(response.body["progress"]["status"], "in_progress");
    assert_eq!(response.body["progress"]["currentStep"], 0);
    assert_eq!(response.body["firstStep"]["tokenId"], "T1");
    assert_eq!(response.body["totalSteps"], 2);
}

#[test]
fn test_error_statuses() {
    let gateway = gateway();

    let missing = gateway.handle(&as_alice(start("nope")));
    assert_eq!(missing.status, STATUS_NOT_FOUND);

    assert_eq!(gateway.handle(&as_alice(start("Q"))).status, STATUS_CREATED);
    let again = gateway.handle(&as_alice(start("Q")));
    assert_eq!(again.status, STATUS_CONFLICT);
    assert_eq!(again.body["error"], "conflict");

    let locked = gateway.handle(&as_alice(collect("T2", t2_location())));
    assert_eq!(locked.status, STATUS_FORBIDDEN);

    let far = gateway.handle(&as_alice(collect("T1", Coordinate::new(0.0, 0.0))));
    assert_eq!(far.status, STATUS_BAD_REQUEST);
    assert_eq!(far.body["error"], "out_of_range");

    let bad_scan = gateway.handle(&as_alice(scan("T1", t1_location(), "market")));
    assert_eq!(bad_scan.status, STATUS_UNPROCESSABLE);
    assert!(!bad_scan.retryable);
}

#[test]
fn test_validation_rejects_before_engine() {
    let gateway = gateway();
    gateway.handle(&as_alice(start("Q")));

    let blank = gateway.handle(&as_alice(collect("  ", t1_location())));
    assert_eq!(blank.status, STATUS_BAD_REQUEST);
    assert_eq!(blank.body["error"], "invalid_request");

    let off_globe = gateway.handle(&as_alice(collect("T1", Coordinate::new(91.0, 0.0))));
    assert_eq!(off_globe.status, STATUS_BAD_REQUEST);

    let empty_scan = gateway.handle(&as_alice(scan("T1", t1_location(), "")));
    assert_eq!(empty_scan.status, STATUS_BAD_REQUEST);

    let progress = gateway.engine().get_progress("alice", "Q").unwrap();
    assert!(progress.collected_tokens.is_empty());
}

#[test]
fn test_full_quest_over_gateway() {
    let gateway = gateway();
    gateway.handle(&as_alice(start("Q")));

    let first = gateway.handle(&as_alice(scan("T1", t1_location(), "lighthouse")));
    assert_eq!(first.status, STATUS_OK);
    assert_eq!(first.body["outcome"], "collected");
    assert_eq!(first.body["nextStep"]["tokenId"], "T2");

    let last = gateway.handle(&as_alice(collect("T2", t2_location())));
    assert_eq!(last.status, STATUS_OK);
    assert_eq!(last.body["progress"]["status"], "completed");
    assert_eq!(last.body["reward"]["granted"]["gold"], HARBOUR_GOLD);

    let repeat = gateway.handle(&as_alice(collect("T2", t2_location())));
    assert_eq!(repeat.status, STATUS_OK);
    assert_eq!(repeat.body["outcome"], "already_collected");

    let stats = gateway.handle(&as_alice(Operation::GetUserStats));
    assert_eq!(stats.status, STATUS_OK);
    assert_eq!(stats.body["totalCoins"], HARBOUR_GOLD);
    assert_eq!(stats.body["completedQuests"][0]["questId"], "Q");
}

#[test]
fn test_users_are_isolated() {
    let gateway = gateway();
    gateway.handle(&as_alice(start("Q")));

    let bob_progress = gateway.handle(&GatewayRequest::new(
        "bob-token",
        Operation::GetProgress {
            quest_id: "Q".to_string(),
        },
    ));
    assert_eq!(bob_progress.status, STATUS_NOT_FOUND);
}

#[test]
fn test_catalog_reads_and_abandon() {
    let gateway = gateway();

    let list = gateway.handle(&as_alice(Operation::ListQuests));
    assert_eq!(list.status, STATUS_OK);
    assert_eq!(list.body.as_array().map(|a| a.len()), Some(1));

    let quest = gateway.handle(&as_alice(Operation::GetQuest {
        quest_id: "Q".to_string(),
    }));
    assert_eq!(quest.body["title"], "Harbour Legends");
    assert_eq!(quest.body["tokenLocations"][1]["id"], "T2");

    gateway.handle(&as_alice(start("Q")));
    let abandoned = gateway.handle(&as_alice(Operation::AbandonQuest {
        quest_id: "Q".to_string(),
    }));
    assert_eq!(abandoned.status, STATUS_OK);
    assert_eq!(abandoned.body["status"], "abandoned");

    let collect_after = gateway.handle(&as_alice(collect("T1", t1_location())));
    assert_eq!(collect_after.status, STATUS_CONFLICT);
}

#[test]
fn test_request_parsed_from_json_line() {
    let gateway = gateway();
    let line = r#"{"credential": "Bearer alice-token", "operation": "startQuest", "questId": "Q"}"#;
    let request: GatewayRequest = serde_json::from_str(line).unwrap();

    assert_eq!(gateway.handle(&request).status, STATUS_CREATED);
}
