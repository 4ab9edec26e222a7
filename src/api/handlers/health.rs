//! Health, readiness and metrics handlers

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::time::Instant;

use crate::api::error::{ApiError, ErrorCode};
use crate::metrics::metric_names;
use crate::server::AppState;

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub rockets: u64,
    pub response_time_ms: u64,
}

/// `GET /health`: liveness only, never touches storage
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        service: "rocket-resequencer",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /ready`: the projection store answers a query
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, ApiError> {
    let start = Instant::now();
    match state.query.count().await {
        Ok(rockets) => Ok(Json(ReadinessResponse {
            status: "ready",
            storage: state.storage_backend,
            rockets,
            response_time_ms: start.elapsed().as_millis() as u64,
        })),
        Err(e) => Err(ApiError::new(
            ErrorCode::ServiceUnavailable,
            format!("Storage unavailable: {}", e),
        )),
    }
}

/// `GET /metrics`: Prometheus text format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    refresh_gauges(&state).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
}

/// `GET /metrics/json`
pub async fn metrics_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    refresh_gauges(&state).await;
    Json(state.metrics.to_json().await)
}

async fn refresh_gauges(state: &AppState) {
    // A failed count leaves the previous value in place.
    if let Ok(count) = state.query.count().await {
        state
            .metrics
            .set_gauge(metric_names::ROCKETS_TRACKED, count)
            .await;
    }
    state
        .metrics
        .set_gauge(
            metric_names::HTTP_REQUESTS_ACTIVE,
            state.request_tracker.active_count(),
        )
        .await;
    state
        .metrics
        .set_gauge(
            metric_names::HTTP_REQUESTS_TOTAL,
            state.request_tracker.total_count(),
        )
        .await;
}
