//! Attestation evaluator integration tests.
//!
//! Run with: `cargo test --test attestation_test`

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use helpers::{
    spawn_test_server, test_evaluator, BrokenOracle, FakeIdentity, FakeOracle,
};
use rolegate_server::attestation::{create_rule, RuleKind};
use rolegate_server::permissions::{self, Actor, Role};
use rolegate_server::store::{MemoryStore, Store};
use serde::Deserialize;
use uuid::Uuid;

async fn gated_role(store: &MemoryStore, community: Uuid, name: &str, rule: RuleKind) -> Role {
    let role = permissions::create_role(store, community, name, 1, true, true)
        .await
        .unwrap();
    create_rule(store, community, role.id, rule).await.unwrap();
    store.get_role(role.id).await.unwrap().unwrap()
}

fn nft_rule() -> RuleKind {
    RuleKind::Nft {
        contract_address: "0xc0ffee".into(),
        chain_id: 1,
    }
}

#[tokio::test]
async fn allowlist_matches_case_insensitively() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(
        &store,
        community,
        "Listed",
        RuleKind::Allowlist {
            addresses: vec!["0xAAA".into()],
        },
    )
    .await;
    let evaluator = test_evaluator(store.clone());

    assert!(evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xaaa")).await);
    assert!(!evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xBBB")).await);
}

#[tokio::test]
async fn nft_rule_asks_the_oracle() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(&store, community, "Holders", nft_rule()).await;
    let oracle = Arc::new(FakeOracle::holding(&["0xHOLDER"]));
    let evaluator = test_evaluator(store.clone()).with_token_oracle(oracle.clone());

    assert!(evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xholder")).await);
    assert!(!evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xother")).await);
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn slow_oracle_fails_closed() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(&store, community, "Holders", nft_rule()).await;
    let oracle = FakeOracle::holding(&["0xholder"]).with_delay(Duration::from_secs(5));
    let evaluator = test_evaluator(store.clone()).with_token_oracle(Arc::new(oracle));

    let started = std::time::Instant::now();
    let qualifies = evaluator
        .can_claim(&role, &Actor::new(Uuid::new_v4(), "0xholder"))
        .await;

    assert!(!qualifies, "actor holds the token but the oracle timed out");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn oracle_errors_and_missing_oracle_fail_closed() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(&store, community, "Holders", nft_rule()).await;
    let actor = Actor::new(Uuid::new_v4(), "0xholder");

    let unconfigured = test_evaluator(store.clone());
    assert!(!unconfigured.can_claim(&role, &actor).await);

    let broken = test_evaluator(store.clone()).with_token_oracle(Arc::new(BrokenOracle));
    assert!(!broken.can_claim(&role, &actor).await);
}

#[tokio::test]
async fn farcaster_rule_needs_linked_identity() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(&store, community, "Casters", RuleKind::Farcaster).await;
    let evaluator = test_evaluator(store.clone())
        .with_identity_resolver(Arc::new(FakeIdentity::linking(&["0xlinked"])));

    assert!(evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xLINKED")).await);
    assert!(!evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xlonely")).await);
}

#[tokio::test]
async fn manual_and_ruleless_roles_never_qualify() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let actor = Actor::new(Uuid::new_v4(), "0xabc");
    let evaluator = test_evaluator(store.clone());

    let manual = permissions::create_role(store.as_ref(), community, "Staff", 1, false, true)
        .await
        .unwrap();
    assert!(!evaluator.can_claim(&manual, &actor).await);

    let ruleless = permissions::create_role(store.as_ref(), community, "Pending", 2, true, true)
        .await
        .unwrap();
    assert!(!evaluator.can_claim(&ruleless, &actor).await);
}

#[derive(Debug, Deserialize)]
struct CheckParams {
    address: String,
}

/// Callback that approves a single address, answers garbage for "0xbad".
fn callback_router() -> Router {
    Router::new().route(
        "/check",
        get(|Query(params): Query<CheckParams>| async move {
            if params.address == "0xbad" {
                return Json(serde_json::json!({ "ok": true }));
            }
            Json(serde_json::json!({ "success": params.address == "0xapproved" }))
        }),
    )
}

#[tokio::test]
async fn api_rule_follows_callback_answer() {
    let server = spawn_test_server(callback_router()).await;
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(
        &store,
        community,
        "Gate",
        RuleKind::Api {
            uri: format!("{}/check", server.url),
        },
    )
    .await;
    let evaluator = test_evaluator(store.clone());

    assert!(evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xapproved")).await);
    assert!(!evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xdenied")).await);
    // Body without `success` is malformed.
    assert!(!evaluator.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xbad")).await);
}

#[tokio::test]
async fn api_rule_refuses_private_callback_when_screening() {
    let server = spawn_test_server(callback_router()).await;
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let role = gated_role(
        &store,
        community,
        "Gate",
        RuleKind::Api {
            uri: format!("{}/check", server.url),
        },
    )
    .await;
    let screening = rolegate_server::attestation::AttestationEvaluator::new(
        store.clone(),
        helpers::test_timeouts(),
        false,
    )
    .unwrap();

    assert!(!screening.can_claim(&role, &Actor::new(Uuid::new_v4(), "0xapproved")).await);
}

#[tokio::test]
async fn refresh_returns_only_qualifying_editable_roles() {
    let store = Arc::new(MemoryStore::new());
    let community = Uuid::new_v4();
    let defaults = permissions::create_default_roles(store.as_ref(), community)
        .await
        .unwrap();
    let listed = gated_role(
        &store,
        community,
        "Listed",
        RuleKind::Allowlist {
            addresses: vec!["0xabc".into()],
        },
    )
    .await;
    gated_role(
        &store,
        community,
        "Other",
        RuleKind::Allowlist {
            addresses: vec!["0xdef".into()],
        },
    )
    .await;
    let everyone = gated_role(&store, community, "Everyone", RuleKind::Public).await;

    let evaluator = test_evaluator(store.clone());
    let roles = evaluator
        .refresh(&Actor::new(Uuid::new_v4(), "0xABC"), community)
        .await
        .unwrap();

    let mut ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
    ids.sort();
    let mut expected = vec![listed.id, everyone.id];
    expected.sort();
    assert_eq!(ids, expected);
    // The built-in public role is not editable and is never part of a refresh.
    assert!(!ids.contains(&defaults.public.id));
}
