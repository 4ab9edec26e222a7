//! PostgreSQL rocket projection store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{ChannelId, Rocket, SortKey, SortOrder};
use crate::infra::columns::{number_from_column, number_to_column, status_from_column};
use crate::infra::{ResequencerError, Result, RocketStore};

const SELECT_ROCKETS: &str = r#"
    SELECT channel, rocket_type, speed, mission, status, explosion_reason,
           last_message_number, last_message_time
    FROM rockets
"#;

/// PostgreSQL-backed projection store, one row per channel
pub struct PgRocketStore {
    pool: PgPool,
}

impl PgRocketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RocketStore for PgRocketStore {
    async fn get(&self, channel: &ChannelId) -> Result<Option<Rocket>> {
        let query = format!("{} WHERE channel = $1", SELECT_ROCKETS);
        let row = sqlx::query_as::<_, RocketRow>(&query)
            .bind(channel.0)
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

    #[instrument(skip(self, rocket), fields(channel = %rocket.channel))]
    async fn upsert(&self, rocket: &Rocket) -> Result<()> {
        let last_number = rocket
            .last_message_number
            .map(number_to_column)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO rockets (
                channel, rocket_type, speed, mission, status, explosion_reason,
                last_message_number, last_message_time, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (channel) DO UPDATE SET
                rocket_type = EXCLUDED.rocket_type,
                speed = EXCLUDED.speed,
                mission = EXCLUDED.mission,
                status = EXCLUDED.status,
                explosion_reason = EXCLUDED.explosion_reason,
                last_message_number = EXCLUDED.last_message_number,
                last_message_time = EXCLUDED.last_message_time,
                updated_at = NOW()
            "#,
        )
        .bind(rocket.channel.0)
        .bind(&rocket.rocket_type)
        .bind(rocket.speed)
        .bind(&rocket.mission)
        .bind(rocket.status.as_str())
        .bind(rocket.explosion_reason.as_deref())
        .bind(last_number)
        .bind(rocket.last_message_time)
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
    channel: Uuid,
    rocket_type: String,
    speed: i64,
    mission: String,
    status: String,
    explosion_reason: Option<String>,
    last_message_number: Option<i64>,
    last_message_time: Option<DateTime<Utc>>,
}

impl TryFrom<RocketRow> for Rocket {
    type Error = ResequencerError;

    fn try_from(row: RocketRow) -> Result<Self> {
        Ok(Rocket {
            channel: ChannelId::from_uuid(row.channel),
            rocket_type: row.rocket_type,
            speed: row.speed,
            mission: row.mission,
            status: status_from_column(&row.status)?,
            explosion_reason: row.explosion_reason,
            last_message_number: row.last_message_number.map(number_from_column).transpose()?,
            last_message_time: row.last_message_time,
        })
    }
}
