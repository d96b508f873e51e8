//! Error types for web handlers.
//!
//! [`AppError`] bridges [`DispositionError`] and HTTP responses. Every error
//! body has the same shape:
//!
//! ```json
//! { "code": "CONFLICT", "message": "stray 4 is in adoption" }
//! ```
//!
//! Internal errors never expose their cause; it is logged instead.

use animal_control_core::DispositionError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Message returned for every 500.
pub const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState<S>>) -> Result<Json<StrayAnimal>, AppError> {
///     let stray = state.strays.get(id).await?;
///     Ok(Json(stray))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 with the `INVALID_ARGUMENT` code.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "INVALID_ARGUMENT".to_string(),
        )
    }

    /// 500 with the generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_MESSAGE.to_string(),
            "INTERNAL".to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(status = %self.status, code = %self.code, "Internal server error");
            }
        } else {
            tracing::debug!(status = %self.status, code = %self.code, message = %self.message, "Request refused");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<DispositionError> for AppError {
    fn from(err: DispositionError) -> Self {
        let status = match &err {
            DispositionError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispositionError::Conflict(_) => StatusCode::CONFLICT,
            DispositionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            DispositionError::Internal(_) => {
                return Self::internal().with_source(anyhow::Error::new(err));
            }
        };
        let message = match &err {
            DispositionError::Conflict(message) | DispositionError::InvalidArgument(message) => {
                message.clone()
            }
            other => other.to_string(),
        };
        Self::new(status, message, err.code().to_string())
    }
}
