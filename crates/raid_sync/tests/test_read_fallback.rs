//! Read shape: try remote, reconcile the cache, fall back to cached rows

use raid_common::RaidError;
use raid_remote::StaticToken;
use raid_sync::{Freshness, SyncCoordinator};
use raid_test_helpers::prelude::*;
use raid_wire as wire;
use serde_json::Value;
use std::sync::Arc;

fn coordinator(remote: ScriptedRemote) -> SyncCoordinator {
    suppress_logs();
    SyncCoordinator::new(
        seeded_store(),
        Arc::new(remote),
        Arc::new(StaticToken(Some("tok".to_string()))),
    )
}

fn raids_body(raids: &[raid_common::entities::Raid]) -> Value {
    Value::Array(raids.iter().map(wire::raid_to_wire).collect())
}

#[tokio::test]
async fn fresh_fetch_replaces_the_cached_scope() {
    // Cache starts with raid 1; the server now knows raids 2 and 3
    let remote = ScriptedRemote::new().respond(Ok(raids_body(&[raid(2, 3), raid(3, 5)])));
    let coordinator = coordinator(remote);

    let fetched = coordinator.fetch_raids().await.unwrap();
    assert_eq!(fetched.freshness, Freshness::Fresh);
    assert_eq!(
        fetched.data.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![2, 3]
    );

    // Script exhausted: the second fetch serves the reconciled cache,
    // and raid 1 is gone
    let cached = coordinator.fetch_raids().await.unwrap();
    assert_eq!(cached.freshness, Freshness::Cached);
    assert_eq!(
        cached.data.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn connectivity_failure_serves_the_cache() {
    let coordinator = coordinator(ScriptedRemote::offline());

    let fetched = coordinator.fetch_raids().await.unwrap();
    assert_eq!(fetched.freshness, Freshness::Cached);
    assert_eq!(fetched.data.len(), 1);
    assert_eq!(fetched.data[0].id, 1);
}

#[tokio::test]
async fn remote_absence_empties_the_scope() {
    let remote = ScriptedRemote::new().respond(Err(RaidError::NotFound));
    let coordinator = coordinator(remote);

    let fetched = coordinator.fetch_raids().await.unwrap();
    assert_eq!(fetched.freshness, Freshness::Fresh);
    assert!(fetched.data.is_empty());

    let cached = coordinator.fetch_raids().await.unwrap();
    assert_eq!(cached.freshness, Freshness::Cached);
    assert!(cached.data.is_empty());
}

#[tokio::test]
async fn refetching_identical_data_is_idempotent() {
    let body = raids_body(&[raid(2, 3)]);
    let remote = ScriptedRemote::new()
        .respond(Ok(body.clone()))
        .respond(Ok(body));
    let coordinator = coordinator(remote);

    let first = coordinator.fetch_raids().await.unwrap();
    let second = coordinator.fetch_raids().await.unwrap();
    assert_eq!(first.data, second.data);
}

#[tokio::test]
async fn auth_rejection_propagates() {
    let remote =
        ScriptedRemote::new().respond(Err(RaidError::Auth("token expired".to_string())));
    let coordinator = coordinator(remote);

    let result = coordinator.fetch_raids().await;
    assert!(matches!(result, Err(RaidError::Auth(_))));
}

#[tokio::test]
async fn race_reconciliation_does_not_cross_raid_scopes() {
    let store = seeded_store();
    store.upsert_race(&race(9, 2)).unwrap();

    let remote = ScriptedRemote::new().respond(Ok(Value::Array(vec![])));
    let coordinator = SyncCoordinator::new(
        store,
        Arc::new(remote),
        Arc::new(StaticToken(None)),
    );

    // Raid 1 now has no races on the server
    let fresh = coordinator.fetch_races_for_raid(1).await.unwrap();
    assert!(fresh.data.is_empty());

    // Raid 2's cached race survives the other scope's clear
    let cached = coordinator.fetch_races_for_raid(2).await.unwrap();
    assert_eq!(cached.freshness, Freshness::Cached);
    assert_eq!(cached.data.iter().map(|r| r.id).collect::<Vec<_>>(), vec![9]);
}

#[tokio::test]
async fn team_fetch_reconciles_roster_and_registration() {
    let mut element = wire::team_to_wire(&team(7));
    if let Some(map) = element.as_object_mut() {
        map.insert("members".to_string(), serde_json::json!([1, 2]));
        map.insert(
            "registration".to_string(),
            serde_json::json!({"teamId": 7, "raceId": 1, "validated": true}),
        );
    }
    let remote = ScriptedRemote::new().respond(Ok(Value::Array(vec![element])));
    let coordinator = coordinator(remote);

    let fetched = coordinator.fetch_teams_for_race(1).await.unwrap();
    assert_eq!(fetched.data.len(), 1);
    assert_eq!(fetched.data[0].id, 7);

    let cached = coordinator.fetch_teams_for_race(1).await.unwrap();
    assert_eq!(cached.freshness, Freshness::Cached);
    assert_eq!(cached.data[0].id, 7);
}
