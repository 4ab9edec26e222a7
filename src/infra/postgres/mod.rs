//! PostgreSQL implementations for production storage
//!
//! Provides the durable message log, the projection store, and advisory-lock
//! channel serialization for deployments running several instances.

mod channel_lock;
mod message_log;
mod rocket_store;

pub use channel_lock::*;
pub use message_log::*;
pub use rocket_store::*;

use sqlx::postgres::{PgPool, PgPoolOptions};

use super::Result;

/// Connect a pool with the given connection cap.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
