//! Postgres-backed integration tests.
//!
//! These are ignored by default and are intended to run in CI (or locally)
//! with `DATABASE_URL` set.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rocket_resequencer::domain::{ChannelId, SortKey, SortOrder};
use rocket_resequencer::infra::{
    postgres, ChannelSerializer, MessageLog, PgAdvisoryChannelLocks, PgMessageLog,
    PgRocketStore, RocketStore,
};
use rocket_resequencer::resequencer::Resequencer;

use common::*;

async fn connect_db() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = postgres::connect(&url, 20).await.ok()?;
    rocket_resequencer::migrations::run_postgres(&pool)
        .await
        .unwrap();
    Some(pool)
}

fn resequencer(
    pool: &sqlx::PgPool,
    lock_pool: Option<sqlx::PgPool>,
) -> (Arc<Resequencer>, Arc<dyn RocketStore>) {
    let log: Arc<dyn MessageLog> = Arc::new(PgMessageLog::new(pool.clone()));
    let rockets: Arc<dyn RocketStore> = Arc::new(PgRocketStore::new(pool.clone()));
    let mut resequencer = Resequencer::new(log, rockets.clone());
    if let Some(lock_pool) = lock_pool {
        resequencer =
            resequencer.with_serializer(Arc::new(PgAdvisoryChannelLocks::new(lock_pool)));
    }
    (Arc::new(resequencer), rockets)
}

#[tokio::test]
#[ignore]
async fn postgres_out_of_order_ingest_catches_up() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let (resequencer, rockets) = resequencer(&pool, None);
    let channel = ChannelId::new();

    for message in [
        speed_decreased(channel, 3, 500),
        launched(channel, 1, "Falcon-9", 500, "ARTEMIS"),
        speed_increased(channel, 2, 3000),
        exploded(channel, 4, "PRESSURE_VESSEL_FAILURE"),
    ] {
        resequencer.ingest(&message).await.unwrap();
    }

    let rocket = rockets.get(&channel).await.unwrap().unwrap();
    assert_eq!(rocket.speed, 3000);
    assert_eq!(rocket.last_message_number, Some(4));
    assert_eq!(
        rocket.explosion_reason.as_deref(),
        Some("PRESSURE_VESSEL_FAILURE")
    );

    let rebuilt = resequencer.rebuild(&channel).await.unwrap().unwrap();
    assert_eq!(rebuilt, rocket);

    let listed = rockets
        .list(Some(SortKey::LastMessageTime), SortOrder::Desc)
        .await
        .unwrap();
    assert!(listed.iter().any(|r| r.channel == channel));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_two_instances_with_advisory_locks_converge() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let Ok(url) = std::env::var("DATABASE_URL") else {
        return;
    };

    // Two resequencers sharing a database, as two server processes would.
    let (first, rockets) = resequencer(&pool, Some(postgres::connect(&url, 10).await.unwrap()));
    let (second, _) = resequencer(&pool, Some(postgres::connect(&url, 10).await.unwrap()));

    let channel = ChannelId::new();
    let mut messages = vec![launched(channel, 1, "Falcon-9", 500, "ARTEMIS")];
    messages.extend((2..=40u64).map(|n| speed_increased(channel, n, 10)));
    messages.reverse();

    let mut handles = Vec::with_capacity(messages.len());
    for (i, message) in messages.into_iter().enumerate() {
        let resequencer = if i % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move {
            resequencer.ingest(&message).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let rocket = rockets.get(&channel).await.unwrap().unwrap();
    assert_eq!(rocket.last_message_number, Some(40));
    assert_eq!(rocket.speed, 500 + 39 * 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn postgres_busy_channel_does_not_starve_lock_pool() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let Ok(url) = std::env::var("DATABASE_URL") else {
        return;
    };

    let lock_pool_size = 2;
    let locks = Arc::new(PgAdvisoryChannelLocks::new(
        postgres::connect(&url, lock_pool_size).await.unwrap(),
    ));
    let log: Arc<dyn MessageLog> = Arc::new(PgMessageLog::new(pool.clone()));
    let rockets: Arc<dyn RocketStore> = Arc::new(PgRocketStore::new(pool.clone()));
    let resequencer = Arc::new(
        Resequencer::new(log, rockets.clone()).with_serializer(locks.clone()),
    );

    let busy = ChannelId::new();
    let quiet = ChannelId::new();

    // Hold the busy channel so every ingest on it has to wait.
    let held = locks.acquire(&busy).await.unwrap();

    let waiters = lock_pool_size as u64 * 3;
    let mut handles = Vec::new();
    for n in (1..=waiters).rev() {
        let message = if n == 1 {
            launched(busy, 1, "Falcon-9", 500, "ARTEMIS")
        } else {
            speed_increased(busy, n, 10)
        };
        let resequencer = resequencer.clone();
        handles.push(tokio::spawn(async move {
            resequencer.ingest(&message).await.unwrap()
        }));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(
        Duration::from_secs(10),
        resequencer.ingest(&launched(quiet, 1, "Soyuz", 300, "LUNA")),
    )
    .await
    .expect("other channel blocked behind a busy one")
    .unwrap();
    assert_eq!(rockets.get(&quiet).await.unwrap().unwrap().speed, 300);

    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }

    let rocket = rockets.get(&busy).await.unwrap().unwrap();
    assert_eq!(rocket.last_message_number, Some(waiters));
    assert_eq!(rocket.speed, 500 + (waiters as i64 - 1) * 10);
}
