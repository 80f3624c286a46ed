//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Input errors are raised before a stream starts; errors inside a running
/// stream never reach this type and are reported as terminal stream frames.
#[derive(Error, Debug)]
pub enum AppError {
    /// The ask request did not name a dialog
    #[error("Create a dialog first: dialog_id must not be empty")]
    MissingDialogId,

    /// No user with the given name exists
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The dialog does not exist or belongs to another user
    #[error("Dialog not found: {0}")]
    DialogNotFound(i64),

    /// A stored record was not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// The model selector is not known
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Request payload failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Registration with a name that is already taken
    #[error("Username already exists: {0}")]
    UsernameTaken(String),

    /// Wrong username or password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// A reply is already streaming for this dialog
    #[error("A reply is already streaming for dialog {0}")]
    StreamAlreadyActive(i64),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MissingDialogId => StatusCode::BAD_REQUEST,
            AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DialogNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UsernameTaken(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AppError::StreamAlreadyActive(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
