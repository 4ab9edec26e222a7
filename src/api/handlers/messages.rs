//! Message ingestion handler

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::warn;

use crate::api::error::{ApiError, ErrorCode};
use crate::domain::{IngestReceipt, Message};
use crate::server::AppState;

/// `POST /messages`
///
/// 200 means the message is logged; the receipt says whether the projection moved.
pub async fn ingest_message(
    State(state): State<AppState>,
    body: Result<Json<Message>, JsonRejection>,
) -> Result<Json<IngestReceipt>, ApiError> {
    let Json(message) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected malformed message body");
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    })?;

    let receipt = state.resequencer.ingest(&message).await?;
    Ok(Json(receipt))
}
