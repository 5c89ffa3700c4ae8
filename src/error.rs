use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidQuery(&'static str),

    #[error("Failed to fetch search results")]
    Upstream { details: String },

    #[error("Error processing request")]
    Stream { details: String },
}

impl GatewayError {
    pub fn upstream(err: anyhow::Error) -> Self {
        GatewayError::Upstream {
            details: format!("{:#}", err),
        }
    }

    pub fn stream(err: anyhow::Error) -> Self {
        GatewayError::Stream {
            details: format!("{:#}", err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { .. } | GatewayError::Stream { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::InvalidQuery(_) => json!({ "error": self.to_string() }),
            GatewayError::Upstream { details } => {
                json!({ "error": self.to_string(), "details": details })
            }
            // the streaming route only ever reports a generic message
            GatewayError::Stream { .. } => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::InvalidQuery("Query parameter is required").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::upstream(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::stream(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_details_keep_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = err.context("sending search request").unwrap_err();
        match GatewayError::upstream(err) {
            GatewayError::Upstream { details } => {
                assert_eq!(details, "sending search request: connection refused")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
