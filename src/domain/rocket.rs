//! The rocket projection: current state folded from a channel's messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::{ChannelId, SortKey, SortOrder};

/// Lifecycle status of a rocket. Nothing transitions `Exploded` back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RocketStatus {
    #[default]
    Active,
    Exploded,
}

impl RocketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RocketStatus::Active => "active",
            RocketStatus::Exploded => "exploded",
        }
    }
}

impl fmt::Display for RocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RocketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RocketStatus::Active),
            "exploded" => Ok(RocketStatus::Exploded),
            other => Err(format!("unknown rocket status: {}", other)),
        }
    }
}

/// Materialized state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rocket {
    pub channel: ChannelId,
    #[serde(rename = "type")]
    pub rocket_type: String,
    pub speed: i64,
    pub mission: String,
    pub status: RocketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explosion_reason: Option<String>,
    /// Resequencing cursor; `None` until a message has been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
}

impl Rocket {
    /// Empty projection for a channel, before any message is applied.
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            rocket_type: String::new(),
            speed: 0,
            mission: String::new(),
            status: RocketStatus::Active,
            explosion_reason: None,
            last_message_number: None,
            last_message_time: None,
        }
    }

    /// Last applied sequence number, 0 before any message.
    pub fn cursor(&self) -> u64 {
        self.last_message_number.unwrap_or(0)
    }

    /// The sequence number the fold is waiting for.
    pub fn next_expected(&self) -> u64 {
        self.cursor().saturating_add(1)
    }

    pub fn is_exploded(&self) -> bool {
        self.status == RocketStatus::Exploded
    }

    /// Compare two projections on a listing key in `order`. Ties always
    /// break by ascending channel, as the SQL stores do.
    pub fn compare_by(&self, other: &Self, key: SortKey, order: SortOrder) -> Ordering {
        let primary = match key {
            SortKey::Channel => self.channel.cmp(&other.channel),
            SortKey::Type => self.rocket_type.cmp(&other.rocket_type),
            SortKey::Speed => self.speed.cmp(&other.speed),
            SortKey::Mission => self.mission.cmp(&other.mission),
            SortKey::Status => self.status.as_str().cmp(other.status.as_str()),
            SortKey::LastMessageNumber => self.last_message_number.cmp(&other.last_message_number),
            SortKey::LastMessageTime => self.last_message_time.cmp(&other.last_message_time),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| self.channel.cmp(&other.channel))
    }
}
