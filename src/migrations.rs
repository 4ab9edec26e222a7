//! Database migrations.
//!
//! Uses SQLx embedded migrations for both the Postgres and the SQLite backend.
//! Both create the same `messages` and `rockets` tables.

use sqlx::{PgPool, SqlitePool};

use crate::infra::Result;

static POSTGRES_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/postgres");
static SQLITE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/sqlite");

pub async fn run_postgres(pool: &PgPool) -> Result<()> {
    POSTGRES_MIGRATOR.run(pool).await?;
    Ok(())
}

pub async fn run_sqlite(pool: &SqlitePool) -> Result<()> {
    SQLITE_MIGRATOR.run(pool).await?;
    Ok(())
}
