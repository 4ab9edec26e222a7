//! Error types for the rocket resequencer infrastructure

use thiserror::Error;

use crate::domain::{ChannelId, TransitionError};

/// Errors that can occur while logging, projecting or querying messages
#[derive(Error, Debug)]
pub enum ResequencerError {
    /// Durable append of an incoming message failed; the whole ingest may be retried
    #[error("failed to log message {message_number} for channel {channel}: {source}")]
    LogWriteFailed {
        channel: ChannelId,
        message_number: u64,
        #[source]
        source: Box<ResequencerError>,
    },

    /// The sequence number is outside the storable range; nothing was logged
    #[error("message number {message_number} for channel {channel} exceeds {max}")]
    MessageNumberOutOfRange {
        channel: ChannelId,
        message_number: u64,
        max: u64,
    },

    /// A logged message could not be applied; the channel's fold halts at it
    #[error("failed to apply message {message_number} for channel {channel}: {source}")]
    ApplyFailed {
        channel: ChannelId,
        message_number: u64,
        #[source]
        source: TransitionError,
    },

    /// No projection exists for the channel
    #[error("rocket not found: {0}")]
    NotFound(ChannelId),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back to a domain value
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResequencerError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResequencerError::LogWriteFailed { .. } | ResequencerError::Database(_)
        )
    }
}

/// Result type for resequencer operations
pub type Result<T> = std::result::Result<T, ResequencerError>;
