//! Error types for the ingestion service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload rejected before a record was created
    #[error("File size too large ({size} bytes). Maximum size is {max} bytes.")]
    FileTooLarge { size: u64, max: u64 },

    /// Record absent or not owned by the requester
    #[error("File not found: {0}")]
    NotFound(String),

    /// Request did not identify its owner
    #[error("Missing owner identity")]
    MissingOwner,

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File record store error
    #[error("Database error: {0}")]
    Database(String),

    /// Blob store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for a file id
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::FileTooLarge { .. } => (StatusCode::BAD_REQUEST, "file_too_large"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::MissingOwner => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let too_large = Error::FileTooLarge { size: 20, max: 10 }.into_response();
        assert_eq!(too_large.status(), StatusCode::BAD_REQUEST);

        let missing = Error::not_found("abc").into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let anonymous = Error::MissingOwner.into_response();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let storage = Error::storage("disk full").into_response();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_file_too_large_message() {
        let err = Error::FileTooLarge { size: 2048, max: 1024 };
        assert_eq!(
            err.to_string(),
            "File size too large (2048 bytes). Maximum size is 1024 bytes."
        );
    }
}
