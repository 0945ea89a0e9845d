use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("untrusted source: {0}")]
    UntrustedSource(String),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        RelayError::MalformedInput(msg.into())
    }

    /// Stable machine-readable code, also used as a tracing field.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MalformedInput(_) => "malformed_input",
            RelayError::UntrustedSource(_) => "untrusted_source",
            RelayError::Lookup(_) => "lookup_failed",
            RelayError::Publish(_) => "publish_failed",
            RelayError::Config(_) => "configuration_error",
            RelayError::Internal(_) => "internal_server_error",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_type, msg) = match &self {
            RelayError::MalformedInput(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                m.clone(),
            ),
            RelayError::UntrustedSource(m) => {
                (StatusCode::FORBIDDEN, "permission_error", m.clone())
            }
            RelayError::Lookup(m) => (StatusCode::BAD_GATEWAY, "upstream_error", m.clone()),
            RelayError::Publish(m) => (StatusCode::BAD_GATEWAY, "upstream_error", m.clone()),
            RelayError::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
            RelayError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
