//! Rocket Resequencer Library
//!
//! Ingests rocket telemetry messages that may arrive out of order or more
//! than once, logs every one, and keeps a per-channel rocket projection that
//! reflects the longest contiguous run of messages starting at 1.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (messages, rockets, transitions)
//! - [`infra`] - Storage, channel serialization and shutdown (in-memory, PostgreSQL, SQLite)
//! - [`resequencer`] - Log-then-fold ingestion pipeline
//! - [`query`] - Read access to projections
//! - [`metrics`] - Counters, gauges and latency histograms
//! - [`telemetry`] - Logging and OpenTelemetry integration
//! - [`api`] - REST API routes
//! - [`server`] - Configuration and HTTP server bootstrap

pub mod api;
pub mod domain;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod query;
pub mod resequencer;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    ChannelId, IngestOutcome, IngestReceipt, Message, MessageKind, MessageMetadata, Rocket,
    RocketEvent, RocketStatus, SortKey, SortOrder, ValidationMode,
};

pub use infra::{MessageLog, ResequencerError, Result, RocketStore};
pub use query::RocketQueryService;
pub use resequencer::Resequencer;
