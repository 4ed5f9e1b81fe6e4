//! Error handling for the iDFace gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Gateway-side input validation failure (always 400)
    #[error("{message}")]
    Validation {
        message: String,
        /// Example payload returned to guide correction
        example: Option<Value>,
    },

    /// Missing or wrong API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Device answered with a non-2xx status; status and body are
    /// surfaced verbatim so callers can branch on the device's own code
    #[error("{message}")]
    Device {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// Device unreachable, timed out, or returned a malformed body
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Validation error without an example payload
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            example: None,
        }
    }

    /// Validation error carrying an example payload
    pub fn validation_with_example(message: impl Into<String>, example: Value) -> Self {
        Error::Validation {
            message: message.into(),
            example: Some(example),
        }
    }

    /// The HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Device { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Transport(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Serialization(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({ "error": self.to_string() });

        match &self {
            Error::Validation {
                example: Some(example),
                ..
            } => {
                body["example"] = example.clone();
            }
            Error::Device {
                details: Some(details),
                ..
            } => {
                body["details"] = details.clone();
            }
            _ => {}
        }

        tracing::error!(
            status = %status,
            message = %self,
            "Request error"
        );

        (status, Json(body)).into_response()
    }
}
