use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timed out")]
    UpstreamTimeout,

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, GateError>;

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GateError::UpstreamTimeout
        } else {
            GateError::Upstream(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_gate_error(err: &GateError) -> Self {
        match err {
            GateError::Internal(msg) => Self::new("internal_error", msg, 500),
            // Detail stays in the server log; it names upstream addresses.
            GateError::Upstream(_) => Self::new("bad_gateway", "Upstream request failed", 502),
            GateError::UpstreamTimeout => {
                Self::new("gateway_timeout", "Upstream did not respond in time", 504)
            }
            GateError::PayloadTooLarge(limit) => Self::new(
                "payload_too_large",
                &format!("Request body exceeds {} bytes", limit),
                413,
            ),
            GateError::Configuration(msg) => Self::new("configuration_error", msg, 500),
            GateError::Validation(msg) => Self::new("validation_error", msg, 422),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_gate_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(body)).into_response()
    }
}
