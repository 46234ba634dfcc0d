//! HTTP error responses for failures before streaming starts
//!
//! Only two outcomes exist once a request is rejected up front:
//! - Invalid input: 400 with the validation reason
//! - Anything else: 500 with a fixed message, details go to the log
//!
//! Failures after the event stream is committed are reported in-band by the
//! composer instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::chat::ValidationError;

/// Body text of every 500 response
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Errors returned as a plain JSON response
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body failed validation
    #[error(transparent)]
    InvalidFormat(#[from] ValidationError),

    /// Unexpected failure before the stream was opened
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::InvalidFormat(_) => "validation",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::InvalidFormat(e) => e.to_string(),
            ApiError::Internal(detail) => {
                error!(
                    error_type = self.category(),
                    error_message = %detail,
                    "Request failed before streaming"
                );
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
