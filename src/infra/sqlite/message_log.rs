//! SQLite message log
//!
//! Same table shape as the Postgres log; channel ids, timestamps and payloads
//! are stored as text.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, FromRow};

use crate::domain::{ChannelId, Message};
use crate::infra::columns::{
    channel_from_text, number_from_column, number_to_column, time_from_text, time_to_text,
};
use crate::infra::{MessageLog, ResequencerError, Result};

/// SQLite-backed append-only message log
pub struct SqliteMessageLog {
    pool: SqlitePool,
}

impl SqliteMessageLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn append(&self, message: &Message) -> Result<()> {
        let payload = serde_json::to_string(&message.message)?;

        sqlx::query(
            r#"
            INSERT INTO messages (channel, message_number, message_time, message_type, payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.channel().to_string())
        .bind(number_to_column(message.message_number())?)
        .bind(time_to_text(&message.message_time()))
        .bind(message.message_type())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn range_after(&self, channel: &ChannelId, after: u64) -> Result<Vec<Message>> {
        let Ok(after) = i64::try_from(after) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, message_number, message_time, message_type, payload
            FROM messages
            WHERE channel = ? AND message_number > ?
            ORDER BY message_number ASC, id ASC
            "#,
        )
        .bind(channel.to_string())
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
            WHERE channel = ?
            ORDER BY message_number ASC, id ASC
            "#,
        )
        .bind(channel.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    channel: String,
    message_number: i64,
    message_time: String,
    message_type: String,
    payload: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = ResequencerError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message::new(
            channel_from_text(&row.channel)?,
            number_from_column(row.message_number)?,
            time_from_text(&row.message_time)?,
            row.message_type,
            serde_json::from_str(&row.payload)?,
        ))
    }
}
