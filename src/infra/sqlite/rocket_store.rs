//! SQLite rocket projection store

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, FromRow};

use crate::domain::{ChannelId, Rocket, SortKey, SortOrder};
use crate::infra::columns::{
    channel_from_text, number_from_column, number_to_column, status_from_column, time_from_text,
    time_to_text,
};
use crate::infra::{ResequencerError, Result, RocketStore};

const SELECT_ROCKETS: &str = r#"
    SELECT channel, rocket_type, speed, mission, status, explosion_reason,
           last_message_number, last_message_time
    FROM rockets
"#;

/// SQLite-backed projection store, one row per channel
pub struct SqliteRocketStore {
    pool: SqlitePool,
}

impl SqliteRocketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RocketStore for SqliteRocketStore {
    async fn get(&self, channel: &ChannelId) -> Result<Option<Rocket>> {
        let query = format!("{} WHERE channel = ?", SELECT_ROCKETS);
        let row = sqlx::query_as::<_, RocketRow>(&query)
            .bind(channel.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Rocket::try_from).transpose()
    }

    async fn list(&self, sort_by: Option<SortKey>, order: SortOrder) -> Result<Vec<Rocket>> {
        // Column names come from the closed SortKey set, never from input.
        let query = match sort_by {
            Some(key) => format!(
                "{} ORDER BY {} {}, channel ASC",
                SELECT_ROCKETS,
                key.column(),
                order.sql()
            ),
            None => SELECT_ROCKETS.to_string(),
        };

        let rows = sqlx::query_as::<_, RocketRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Rocket::try_from).collect()
    }

    async fn upsert(&self, rocket: &Rocket) -> Result<()> {
        let last_number = rocket
            .last_message_number
            .map(number_to_column)
            .transpose()?;
        let last_time = rocket.last_message_time.as_ref().map(time_to_text);
        let now = time_to_text(&chrono::Utc::now());

        sqlx::query(
            r#"
            INSERT INTO rockets (
                channel, rocket_type, speed, mission, status, explosion_reason,
                last_message_number, last_message_time, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel) DO UPDATE SET
                rocket_type = excluded.rocket_type,
                speed = excluded.speed,
                mission = excluded.mission,
                status = excluded.status,
                explosion_reason = excluded.explosion_reason,
                last_message_number = excluded.last_message_number,
                last_message_time = excluded.last_message_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(rocket.channel.to_string())
        .bind(&rocket.rocket_type)
        .bind(rocket.speed)
        .bind(&rocket.mission)
        .bind(rocket.status.as_str())
        .bind(rocket.explosion_reason.as_deref())
        .bind(last_number)
        .bind(last_time)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rockets")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

#[derive(Debug, FromRow)]
struct RocketRow {
    channel: String,
    rocket_type: String,
    speed: i64,
    mission: String,
    status: String,
    explosion_reason: Option<String>,
    last_message_number: Option<i64>,
    last_message_time: Option<String>,
}

impl TryFrom<RocketRow> for Rocket {
    type Error = ResequencerError;

    fn try_from(row: RocketRow) -> Result<Self> {
        Ok(Rocket {
            channel: channel_from_text(&row.channel)?,
            rocket_type: row.rocket_type,
            speed: row.speed,
            mission: row.mission,
            status: status_from_column(&row.status)?,
            explosion_reason: row.explosion_reason,
            last_message_number: row.last_message_number.map(number_from_column).transpose()?,
            last_message_time: row
                .last_message_time
                .as_deref()
                .map(time_from_text)
                .transpose()?,
        })
    }
}
