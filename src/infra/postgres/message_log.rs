//! PostgreSQL message log
//!
//! Every received message becomes one row in `messages`. Rows are never
//! updated or deleted; duplicates of a sequence number are separate rows and
//! reads order them by `(message_number, id)` so the first logged wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{ChannelId, Message};
use crate::infra::columns::{number_from_column, number_to_column};
use crate::infra::{MessageLog, Result};

/// PostgreSQL-backed append-only message log
pub struct PgMessageLog {
    pool: PgPool,
}

impl PgMessageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of logged rows for a channel
    pub async fn count(&self, channel: &ChannelId) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE channel = $1")
            .bind(channel.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

#[async_trait]
impl MessageLog for PgMessageLog {
    #[instrument(skip(self, message), fields(channel = %message.channel(), message_number = message.message_number()))]
    async fn append(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (channel, message_number, message_time, message_type, payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.channel().0)
        .bind(number_to_column(message.message_number())?)
        .bind(message.message_time())
        .bind(message.message_type())
        .bind(Json(&message.message))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn range_after(&self, channel: &ChannelId, after: u64) -> Result<Vec<Message>> {
        // Numbers beyond i64::MAX were never storable.
        let Ok(after) = i64::try_from(after) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, message_number, message_time, message_type, payload
            FROM messages
            WHERE channel = $1 AND message_number > $2
            ORDER BY message_number ASC, id ASC
            "#,
        )
        .bind(channel.0)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn all(&self, channel: &ChannelId) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, message_number, message_time, message_type, payload
            FROM messages
            WHERE channel = $1
            ORDER BY message_number ASC, id ASC
            "#,
        )
        .bind(channel.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    channel: Uuid,
    message_number: i64,
    message_time: DateTime<Utc>,
    message_type: String,
    payload: Json<serde_json::Value>,
}

impl TryFrom<MessageRow> for Message {
    type Error = crate::infra::ResequencerError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message::new(
            ChannelId::from_uuid(row.channel),
            number_from_column(row.message_number)?,
            row.message_time,
            row.message_type,
            row.payload.0,
        ))
    }
}
