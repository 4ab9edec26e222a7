//! Rocket projection query handlers

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::types::{ListRocketsQuery, MessageHistoryResponse, RocketListResponse};
use crate::domain::{ChannelId, Rocket, SortKey, SortOrder};
use crate::server::AppState;

/// `GET /rockets?sortBy=<key>&order=asc|desc`
pub async fn list_rockets(
    State(state): State<AppState>,
    Query(query): Query<ListRocketsQuery>,
) -> Result<Json<RocketListResponse>, ApiError> {
    let sort_by = query
        .sort_by
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<SortKey>)
        .transpose()
        .map_err(|e| invalid_query("sortBy", e))?;

    let order = query
        .order
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<SortOrder>)
        .transpose()
        .map_err(|e| invalid_query("order", e))?
        .unwrap_or_default();

    let rockets = state.query.list(sort_by, order).await?;
    Ok(Json(RocketListResponse { rockets }))
}

/// `GET /rockets/:channel`
pub async fn get_rocket(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<Rocket>, ApiError> {
    let channel = parse_channel(&channel)?;
    Ok(Json(state.query.get(&channel).await?))
}

/// `GET /rockets/:channel/messages`
pub async fn get_rocket_messages(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<MessageHistoryResponse>, ApiError> {
    let channel = parse_channel(&channel)?;
    let messages = state.resequencer.history(&channel).await?;
    Ok(Json(MessageHistoryResponse {
        count: messages.len(),
        messages,
    }))
}

fn parse_channel(raw: &str) -> Result<ChannelId, ApiError> {
    raw.parse().map_err(|e| {
        ApiError::new(
            ErrorCode::InvalidFieldValue,
            format!("Invalid channel id '{}': {}", raw, e),
        )
        .with_details(serde_json::json!({ "field": "channel" }))
    })
}

fn invalid_query(field: &str, message: String) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, message)
        .with_details(serde_json::json!({ "field": field }))
}
