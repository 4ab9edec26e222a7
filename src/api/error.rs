//! Structured API error responses with error codes
//!
//! Every error body has the same shape and carries both a stable string code
//! and a numeric code; the string code is repeated in the `x-error-code`
//! header.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::ResequencerError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (3xxx)
    /// Request body is not a well-formed message
    InvalidRequestBody,
    /// Path or query value is invalid
    InvalidFieldValue,

    // Resource errors (4xxx)
    /// No projection exists for the channel
    RocketNotFound,

    // State errors (7xxx)
    /// Message was logged but could not be applied
    MessageRejected,

    // Infrastructure errors (8xxx)
    /// Database operation failed
    DatabaseError,
    /// A dependency is not reachable
    ServiceUnavailable,
    /// The message could not be logged; safe to retry
    LogWriteFailed,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3003,
            ErrorCode::RocketNotFound => 4001,
            ErrorCode::MessageRejected => 7001,
            ErrorCode::DatabaseError => 8001,
            ErrorCode::ServiceUnavailable => 8002,
            ErrorCode::LogWriteFailed => 8003,
            ErrorCode::InternalError => 8999,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequestBody | ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::RocketNotFound => StatusCode::NOT_FOUND,
            ErrorCode::MessageRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::LogWriteFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::RocketNotFound => "ROCKET_NOT_FOUND",
            ErrorCode::MessageRejected => "MESSAGE_REJECTED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::LogWriteFailed => "LOG_WRITE_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds after which a retry is reasonable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Channel the error refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
                resource_id: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code.as_str();
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            HeaderName::from_static("x-error-code"),
            HeaderValue::from_static(code),
        );

        response
    }
}

// ============================================================================
// Conversion from ResequencerError
// ============================================================================

impl From<ResequencerError> for ApiError {
    fn from(err: ResequencerError) -> Self {
        match err {
            ResequencerError::LogWriteFailed {
                channel,
                message_number,
                source,
            } => ApiError::new(
                ErrorCode::LogWriteFailed,
                format!("Failed to log message: {}", source),
            )
            .with_resource_id(channel.to_string())
            .with_details(serde_json::json!({ "messageNumber": message_number }))
            .with_retry_after(1),
            ResequencerError::MessageNumberOutOfRange {
                channel,
                message_number,
                max,
            } => ApiError::new(
                ErrorCode::InvalidFieldValue,
                format!("Message number {} exceeds {}", message_number, max),
            )
            .with_resource_id(channel.to_string())
            .with_details(serde_json::json!({
                "field": "messageNumber",
                "messageNumber": message_number,
                "max": max,
            })),
            ResequencerError::ApplyFailed {
                channel,
                message_number,
                source,
            } => ApiError::new(
                ErrorCode::MessageRejected,
                format!(
                    "Message {} was logged but could not be applied: {}",
                    message_number, source
                ),
            )
            .with_resource_id(channel.to_string())
            .with_details(serde_json::json!({ "messageNumber": message_number })),
            ResequencerError::NotFound(channel) => ApiError::new(
                ErrorCode::RocketNotFound,
                format!("Rocket not found: {}", channel),
            )
            .with_resource_id(channel.to_string()),
            ResequencerError::Database(e) => {
                ApiError::new(ErrorCode::DatabaseError, format!("Database error: {}", e))
            }
            ResequencerError::Migration(e) => {
                ApiError::new(ErrorCode::DatabaseError, format!("Migration error: {}", e))
            }
            ResequencerError::CorruptRecord(msg) => {
                ApiError::new(ErrorCode::DatabaseError, format!("Corrupt record: {}", msg))
            }
            ResequencerError::Serialization(e) => ApiError::new(
                ErrorCode::InternalError,
                format!("Serialization error: {}", e),
            ),
            ResequencerError::Configuration(msg) => ApiError::new(
                ErrorCode::InternalError,
                format!("Configuration error: {}", msg),
            ),
            ResequencerError::Internal(msg) => ApiError::new(ErrorCode::InternalError, msg),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
