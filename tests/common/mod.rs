//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use rocket_resequencer::domain::{ChannelId, Message, RocketEvent, ValidationMode};
use rocket_resequencer::infra::{
    ChannelSerializer, InMemoryMessageLog, InMemoryRocketStore, MessageLog, RocketStore,
};
use rocket_resequencer::metrics::MetricsRegistry;
use rocket_resequencer::resequencer::Resequencer;

/// Fixed channel for tests that need a stable identifier
pub fn test_channel() -> ChannelId {
    ChannelId::from_uuid(Uuid::parse_str("193270a9-c9cf-404a-8f83-838e71d9ae67").unwrap())
}

/// Deterministic message time: one second per sequence number after a fixed epoch
/// One second per message number, capped at a year past the first message.
pub fn message_time(message_number: u64) -> DateTime<Utc> {
    let offset = message_number.min(365 * 24 * 60 * 60) as i64;
    Utc.with_ymd_and_hms(2022, 2, 2, 19, 39, 5).unwrap() + Duration::seconds(offset)
}

pub fn launched(channel: ChannelId, n: u64, rocket_type: &str, speed: i64, mission: &str) -> Message {
    Message::from_event(
        channel,
        n,
        message_time(n),
        &RocketEvent::Launched {
            rocket_type: rocket_type.to_string(),
            launch_speed: speed,
            mission: mission.to_string(),
        },
    )
}

pub fn speed_increased(channel: ChannelId, n: u64, by: i64) -> Message {
    Message::from_event(channel, n, message_time(n), &RocketEvent::SpeedIncreased { by })
}

pub fn speed_decreased(channel: ChannelId, n: u64, by: i64) -> Message {
    Message::from_event(channel, n, message_time(n), &RocketEvent::SpeedDecreased { by })
}

pub fn exploded(channel: ChannelId, n: u64, reason: &str) -> Message {
    Message::from_event(
        channel,
        n,
        message_time(n),
        &RocketEvent::Exploded {
            reason: reason.to_string(),
        },
    )
}

pub fn mission_changed(channel: ChannelId, n: u64, mission: &str) -> Message {
    Message::from_event(
        channel,
        n,
        message_time(n),
        &RocketEvent::MissionChanged {
            new_mission: mission.to_string(),
        },
    )
}

/// A message whose payload does not decode for its kind
pub fn malformed_speed_increase(channel: ChannelId, n: u64) -> Message {
    Message::new(
        channel,
        n,
        message_time(n),
        "SpeedIncreased",
        json!({ "by": "fast" }),
    )
}

/// Wire body for `POST /messages`
pub fn message_body(message: &Message) -> serde_json::Value {
    serde_json::to_value(message).unwrap()
}

// ============================================================================
// Resequencer Fixture
// ============================================================================

/// In-memory resequencer with handles on its stores
pub struct TestResequencer {
    pub resequencer: Arc<Resequencer>,
    pub log: Arc<InMemoryMessageLog>,
    pub rockets: Arc<InMemoryRocketStore>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Builder for [`TestResequencer`]
#[derive(Default)]
pub struct TestResequencerBuilder {
    validation: ValidationMode,
    serializer: Option<Arc<dyn ChannelSerializer>>,
}

impl TestResequencerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.validation = ValidationMode::Strict;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn ChannelSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn build(self) -> TestResequencer {
        let log = Arc::new(InMemoryMessageLog::new());
        let rockets = Arc::new(InMemoryRocketStore::new());
        let metrics = Arc::new(MetricsRegistry::new());

        let log_dyn: Arc<dyn MessageLog> = log.clone();
        let rockets_dyn: Arc<dyn RocketStore> = rockets.clone();
        let mut resequencer = Resequencer::new(log_dyn, rockets_dyn)
            .with_validation_mode(self.validation)
            .with_metrics(metrics.clone());
        if let Some(serializer) = self.serializer {
            resequencer = resequencer.with_serializer(serializer);
        }

        TestResequencer {
            resequencer: Arc::new(resequencer),
            log,
            rockets,
            metrics,
        }
    }
}

impl TestResequencer {
    pub fn new() -> Self {
        TestResequencerBuilder::new().build()
    }

    /// Ingest every message in order, panicking on error
    pub async fn ingest_all(&self, messages: &[Message]) {
        for message in messages {
            self.resequencer.ingest(message).await.unwrap();
        }
    }
}
