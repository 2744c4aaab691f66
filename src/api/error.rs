//! API error handling.
//!
//! Every error response has the shape `{"detail": ...}`. Not-found and
//! internal errors carry a message string; validation errors carry a list
//! of field errors.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::infrastructure::RepositoryError;

/// Detail message for a missing task.
pub const TASK_NOT_FOUND: &str = "Task not found";

// =============================================================================
// API Error
// =============================================================================

/// Payload of the `detail` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// Plain message.
    Message(String),
    /// Field-level validation failures.
    Fields(Vec<FieldError>),
}

/// API error structure for JSON responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// What went wrong.
    pub detail: ErrorDetail,
}

impl ApiError {
    /// Creates an error with a plain message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            detail: ErrorDetail::Message(message.into()),
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub const fn validation(details: Vec<FieldError>) -> Self {
        Self {
            detail: ErrorDetail::Fields(details),
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the field that failed validation.
    pub field: String,
    /// Error message for this field.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Error details.
    pub error: ApiError,
}

impl ApiErrorResponse {
    /// Creates a new API error response.
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// Creates a 422 Unprocessable Entity response for validation errors.
    #[must_use]
    pub const fn validation_error(details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::validation(details),
        )
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new(message))
    }

    /// Creates the 404 response for a task id that does not exist.
    #[must_use]
    pub fn task_not_found() -> Self {
        Self::not_found(TASK_NOT_FOUND)
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiError::new(message))
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        // Internal errors should not expose details to clients.
        tracing::error!(%error, "Task store operation failed");
        Self::internal_error("An internal error occurred")
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_error(vec![FieldError::new("body", rejection.body_text())])
    }
}

impl From<PathRejection> for ApiErrorResponse {
    fn from(rejection: PathRejection) -> Self {
        Self::validation_error(vec![FieldError::new("id", rejection.body_text())])
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Validation error type for request validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field-level errors.
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error(error.errors)
    }
}

// =============================================================================
// Tests
// =============================================================================
