//! Infrastructure layer for the rocket resequencer
//!
//! Contains trait definitions and implementations for:
//! - Message log and projection storage (in-memory, PostgreSQL, SQLite)
//! - Per-channel serialization (local, striped, Postgres advisory locks)
//! - Graceful shutdown (request draining)

mod channel_lock;
pub(crate) mod columns;
mod error;
mod graceful_shutdown;
pub mod memory;
pub mod postgres;
pub mod sqlite;
mod traits;

pub use channel_lock::{
    ChannelGuard, ChannelSerializer, LocalChannelLocks, StripedChannelLocks, DEFAULT_LOCK_STRIPES,
    DEFAULT_PRUNE_THRESHOLD,
};
pub use error::*;
pub use graceful_shutdown::{
    serve_with_shutdown, shutdown_signal, GracefulShutdownConfig, RequestGuard, RequestTracker,
};
pub use memory::{InMemoryMessageLog, InMemoryRocketStore};
pub use postgres::{PgAdvisoryChannelLocks, PgMessageLog, PgRocketStore};
pub use sqlite::{SqliteMessageLog, SqliteRocketStore};
pub use traits::*;
