//! Shared request and response types for REST API handlers.

use serde::{Deserialize, Serialize};

use crate::domain::{Message, Rocket};

/// Query string for `GET /rockets`. Values are parsed by the handler so
/// that bad input gets a structured error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRocketsQuery {
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RocketListResponse {
    pub rockets: Vec<Rocket>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageHistoryResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}
