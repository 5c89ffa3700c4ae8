use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data_models::ChatMessage;
use crate::error::GatewayError;

pub const MISSING_QUERY: &str = "Query parameter is required";

/// Body of `POST /api/chat/v2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
}

impl SearchRequest {
    /// `query` must be a string that is not blank; the stored value is trimmed.
    pub fn from_body(body: &Value) -> Result<SearchRequest, GatewayError> {
        match body.get("query") {
            Some(Value::String(query)) if !query.trim().is_empty() => Ok(SearchRequest {
                query: query.trim().to_string(),
            }),
            _ => Err(GatewayError::InvalidQuery(MISSING_QUERY)),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
