//! Postgres advisory locks as a cross-process channel serializer
//!
//! `pg_advisory_xact_lock` is held for the life of the transaction that took
//! it. The guard owns that transaction; dropping the guard rolls it back and
//! releases the lock. Lock keys are the first 8 bytes of the channel UUID,
//! so two channels may share a key and wait on each other.
//!
//! Within one process, callers first queue on a [`LocalChannelLocks`] entry
//! and only the head of that queue opens a transaction. A busy channel
//! therefore holds at most one lock-pool connection per process.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::domain::ChannelId;
use crate::infra::{ChannelGuard, ChannelSerializer, LocalChannelLocks, Result};

/// Channel serializer shared by every process using the same database
pub struct PgAdvisoryChannelLocks {
    pool: PgPool,
    local: LocalChannelLocks,
}

impl PgAdvisoryChannelLocks {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            local: LocalChannelLocks::new(),
        }
    }
}

#[async_trait]
impl ChannelSerializer for PgAdvisoryChannelLocks {
    #[instrument(skip_all, fields(channel = %channel, lock_key = channel.lock_key()))]
    async fn acquire(&self, channel: &ChannelId) -> Result<ChannelGuard> {
        let local = self.local.acquire(channel).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(channel.lock_key())
            .execute(&mut *tx)
            .await?;

        // Tuple fields drop in order: the advisory lock goes before the local one.
        Ok(ChannelGuard::new((tx, local)))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
