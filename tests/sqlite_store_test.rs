//! SQLite-backed store tests against an in-memory database.

mod common;

use std::sync::Arc;

use rocket_resequencer::domain::{
    ChannelId, Rocket, RocketStatus, SortKey, SortOrder, MAX_MESSAGE_NUMBER,
};
use rocket_resequencer::infra::{
    sqlite, MessageLog, ResequencerError, RocketStore, SqliteMessageLog, SqliteRocketStore,
};
use rocket_resequencer::resequencer::Resequencer;

use common::*;

async fn connect() -> sqlx::SqlitePool {
    let pool = sqlite::connect("sqlite::memory:", 1).await.unwrap();
    rocket_resequencer::migrations::run_sqlite(&pool)
        .await
        .unwrap();
    pool
}

#[tokio::test]
async fn test_log_orders_by_message_number() {
    let log = SqliteMessageLog::new(connect().await);
    let channel = test_channel();
    let other = ChannelId::new();

    for message in [
        speed_increased(channel, 3, 30),
        launched(channel, 1, "Falcon-9", 500, "ARTEMIS"),
        speed_increased(other, 1, 1),
        speed_increased(channel, 2, 20),
        speed_increased(channel, 2, 20),
    ] {
        log.append(&message).await.unwrap();
    }

    let all = log.all(&channel).await.unwrap();
    let numbers: Vec<u64> = all.iter().map(|m| m.message_number()).collect();
    assert_eq!(numbers, vec![1, 2, 2, 3]);
    assert_eq!(all[0], launched(channel, 1, "Falcon-9", 500, "ARTEMIS"));

    let after: Vec<u64> = log
        .range_after(&channel, 2)
        .await
        .unwrap()
        .iter()
        .map(|m| m.message_number())
        .collect();
    assert_eq!(after, vec![3]);

    assert!(log.range_after(&channel, u64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rocket_upsert_round_trips() {
    let store = SqliteRocketStore::new(connect().await);
    let channel = test_channel();

    assert!(store.get(&channel).await.unwrap().is_none());

    let mut rocket = Rocket::new(channel);
    rocket.rocket_type = "Falcon-9".to_string();
    rocket.speed = 500;
    rocket.mission = "ARTEMIS".to_string();
    rocket.last_message_number = Some(1);
    rocket.last_message_time = Some(message_time(1));
    store.upsert(&rocket).await.unwrap();
    assert_eq!(store.get(&channel).await.unwrap(), Some(rocket.clone()));

    rocket.status = RocketStatus::Exploded;
    rocket.explosion_reason = Some("PRESSURE_VESSEL_FAILURE".to_string());
    rocket.last_message_number = Some(2);
    rocket.last_message_time = Some(message_time(2));
    store.upsert(&rocket).await.unwrap();

    assert_eq!(store.get(&channel).await.unwrap(), Some(rocket));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_rocket_list_sorting() {
    let store = SqliteRocketStore::new(connect().await);
    for (speed, mission) in [(500, "B"), (1000, "C"), (300, "A")] {
        let mut rocket = Rocket::new(ChannelId::new());
        rocket.speed = speed;
        rocket.mission = mission.to_string();
        rocket.last_message_number = Some(1);
        store.upsert(&rocket).await.unwrap();
    }

    let speeds = |rockets: Vec<Rocket>| rockets.into_iter().map(|r| r.speed).collect::<Vec<_>>();

    assert_eq!(
        speeds(store.list(Some(SortKey::Speed), SortOrder::Asc).await.unwrap()),
        vec![300, 500, 1000]
    );
    assert_eq!(
        speeds(store.list(Some(SortKey::Speed), SortOrder::Desc).await.unwrap()),
        vec![1000, 500, 300]
    );
    assert_eq!(
        speeds(store.list(Some(SortKey::Mission), SortOrder::Asc).await.unwrap()),
        vec![300, 500, 1000]
    );
    assert_eq!(store.list(None, SortOrder::Asc).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unstorable_message_number_matches_memory_backend() {
    let pool = connect().await;
    let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(pool.clone()));
    let rockets: Arc<dyn RocketStore> = Arc::new(SqliteRocketStore::new(pool));
    let resequencer = Resequencer::new(log.clone(), rockets);
    let channel = test_channel();

    let err = resequencer
        .ingest(&speed_increased(channel, u64::MAX, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ResequencerError::MessageNumberOutOfRange { .. }));
    assert!(log.all(&channel).await.unwrap().is_empty());

    resequencer
        .ingest(&speed_increased(channel, MAX_MESSAGE_NUMBER, 10))
        .await
        .unwrap();
    let numbers: Vec<u64> = log
        .all(&channel)
        .await
        .unwrap()
        .iter()
        .map(|m| m.message_number())
        .collect();
    assert_eq!(numbers, vec![MAX_MESSAGE_NUMBER]);
}

#[tokio::test]
async fn test_resequencer_over_sqlite() {
    let pool = connect().await;
    let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(pool.clone()));
    let rockets: Arc<dyn RocketStore> = Arc::new(SqliteRocketStore::new(pool));
    let resequencer = Resequencer::new(log, rockets.clone());
    let channel = test_channel();

    for message in [
        speed_decreased(channel, 3, 500),
        launched(channel, 1, "Falcon-9", 500, "ARTEMIS"),
        speed_increased(channel, 2, 3000),
    ] {
        resequencer.ingest(&message).await.unwrap();
    }

    let rocket = rockets.get(&channel).await.unwrap().unwrap();
    assert_eq!(rocket.speed, 3000);
    assert_eq!(rocket.last_message_number, Some(3));

    let rebuilt = resequencer.rebuild(&channel).await.unwrap().unwrap();
    assert_eq!(rebuilt, rocket);
}
