//! SQLite implementations for single-node deployments and local testing
//!
//! Same schema as the Postgres backend, with UUIDs, timestamps and payloads
//! stored as text.

mod message_log;
mod rocket_store;

pub use message_log::*;
pub use rocket_store::*;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::Result;

/// Connect a pool, creating the database file if needed. In-memory databases
/// get a single connection that is never recycled so every query sees the
/// same database.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?
    };
    Ok(pool)
}
