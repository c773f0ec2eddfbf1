//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ember_agent::AgentError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// The model backend failed or answered something unusable
    #[error("{0}")]
    BadGateway(String),

    /// The request could not be completed
    #[error("{0}")]
    Internal(String),

    /// `/tools/call` named a tool that does not exist
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// `/tools/call` arguments have the wrong shape
    #[error("Invalid input")]
    InvalidInput(String),
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Backend(_) => ApiError::BadGateway(e.to_string()),
            AgentError::RoundLimitExceeded(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadGateway(detail) | ApiError::Internal(detail) => json!({ "detail": detail }),
            ApiError::UnknownTool(_) => json!({ "error": self.to_string() }),
            ApiError::InvalidInput(details) => json!({ "error": self.to_string(), "details": details }),
        };

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, self);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_agent::ClientError;

    #[test]
    fn test_agent_error_mapping() {
        let backend: ApiError = AgentError::Backend(ClientError::ApiError("down".to_string())).into();
        assert_eq!(backend.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(backend.to_string(), "API error: down");

        let budget: ApiError = AgentError::RoundLimitExceeded(4).into();
        assert_eq!(budget.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(budget.to_string(), "tool-call budget exceeded after 4 rounds");
    }

    #[test]
    fn test_tool_error_statuses() {
        assert_eq!(ApiError::UnknownTool("x".to_string()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::InvalidInput("x".to_string()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::UnknownTool("x".to_string()).to_string(), "Unknown tool: x");
    }
}
