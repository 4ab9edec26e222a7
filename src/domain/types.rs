//! Core identifiers and query/receipt types for the rocket resequencer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Largest sequence number a message may carry. Every log backend stores
/// numbers as signed 64-bit integers.
pub const MAX_MESSAGE_NUMBER: u64 = i64::MAX as u64;

/// Channel identifier: groups every message and the single projection of one rocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Key for Postgres advisory locks: the first 8 bytes of the UUID, big-endian.
    pub fn lock_key(&self) -> i64 {
        let bytes = self.0.as_bytes();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&bytes[..8]);
        i64::from_be_bytes(prefix)
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for ChannelId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Projection field a rocket listing can be sorted by.
///
/// A closed set so that storage backends can map each key to a fixed column
/// name instead of interpolating caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Channel,
    Type,
    Speed,
    Mission,
    Status,
    LastMessageNumber,
    LastMessageTime,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Channel,
        SortKey::Type,
        SortKey::Speed,
        SortKey::Mission,
        SortKey::Status,
        SortKey::LastMessageNumber,
        SortKey::LastMessageTime,
    ];

    /// Wire name, as used in the `sortBy` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Channel => "channel",
            SortKey::Type => "type",
            SortKey::Speed => "speed",
            SortKey::Mission => "mission",
            SortKey::Status => "status",
            SortKey::LastMessageNumber => "lastMessageNumber",
            SortKey::LastMessageTime => "lastMessageTime",
        }
    }

    /// Column name in the `rockets` table.
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Channel => "channel",
            SortKey::Type => "rocket_type",
            SortKey::Speed => "speed",
            SortKey::Mission => "mission",
            SortKey::Status => "status",
            SortKey::LastMessageNumber => "last_message_number",
            SortKey::LastMessageTime => "last_message_time",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "invalid sort key '{}'; expected one of: {}",
                    s,
                    SortKey::ALL
                        .iter()
                        .map(SortKey::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Sort direction for rocket listings. Ascending unless `desc` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// SQL ordering clause. Absent values sort first ascending and last
    /// descending, matching `Option` ordering in memory.
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC NULLS FIRST",
            SortOrder::Desc => "DESC NULLS LAST",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!(
                "invalid sort order '{}'; expected asc or desc",
                other
            )),
        }
    }
}

/// What an ingest call did after the message was durably logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum IngestOutcome {
    /// The projection was advanced (possibly by zero messages) and persisted.
    Applied {
        /// Messages folded into the projection during this call.
        applied: usize,
        /// Projection cursor after this call.
        #[serde(rename = "lastMessageNumber")]
        last_message_number: u64,
    },
    /// No projection exists yet for the channel; the message waits in the log.
    Deferred,
}

/// Receipt returned for every successfully logged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub channel: ChannelId,
    pub message_number: u64,
    pub outcome: IngestOutcome,
}

impl IngestReceipt {
    pub fn is_deferred(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Deferred)
    }

    /// Projection cursor after the call, if a projection was written.
    pub fn last_message_number(&self) -> Option<u64> {
        match self.outcome {
            IngestOutcome::Applied {
                last_message_number,
                ..
            } => Some(last_message_number),
            IngestOutcome::Deferred => None,
        }
    }
}
