//! Conversions between domain values and SQL column values shared by the
//! Postgres and SQLite backends.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::{ChannelId, RocketStatus, MAX_MESSAGE_NUMBER};

use super::{ResequencerError, Result};

/// Sequence numbers are stored as signed 64-bit integers. Ingest rejects
/// anything above [`MAX_MESSAGE_NUMBER`] before it reaches a backend.
pub(crate) fn number_to_column(number: u64) -> Result<i64> {
    i64::try_from(number).map_err(|_| {
        ResequencerError::Internal(format!(
            "message number {} exceeds {}",
            number, MAX_MESSAGE_NUMBER
        ))
    })
}

pub(crate) fn number_from_column(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| ResequencerError::CorruptRecord(format!("negative message number {}", value)))
}

pub(crate) fn status_from_column(value: &str) -> Result<RocketStatus> {
    value.parse().map_err(ResequencerError::CorruptRecord)
}

/// Fixed-width RFC 3339 so text comparison matches time order.
pub(crate) fn time_to_text(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn time_from_text(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ResequencerError::CorruptRecord(format!("invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn channel_from_text(value: &str) -> Result<ChannelId> {
    value
        .parse()
        .map_err(|e| ResequencerError::CorruptRecord(format!("invalid channel '{}': {}", value, e)))
}
