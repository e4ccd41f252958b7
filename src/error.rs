// vermon: Error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("service not found: {0}")]
    UnknownService(String),

    #[error("downstream request failed: {0}")]
    Downstream(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("verifier error: {0}")]
    Verifier(#[from] vermon_verifier::VerifierError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
            GatewayError::Downstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::Config(_) | GatewayError::Verifier(_) | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// Failures never leak across the HTTP surface as panics or raw strings; they
// all become structured JSON with a matching status code.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}
