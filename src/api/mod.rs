//! REST API for the rocket resequencer
//!
//! Ingestion, projection queries, health and metrics over HTTP/JSON.

pub mod error;
pub mod handlers;
mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
pub use rest::*;
