//! REST routes for the rocket resequencer.

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{
    get_rocket, get_rocket_messages, health_check, ingest_message, list_rockets, metrics_json,
    metrics_prometheus, readiness_check,
};
use crate::server::AppState;

/// Ingestion and query routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(ingest_message))
        .route("/rockets", get(list_rockets))
        .route("/rockets/:channel", get(get_rocket))
        .route("/rockets/:channel/messages", get(get_rocket_messages))
}

/// Health, readiness and metrics routes. Not wrapped by request tracking so
/// health checks do not show up in HTTP metrics.
pub fn ops_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_prometheus))
        .route("/metrics/json", get(metrics_json))
}
