//! API Error Types
//!
//! Maps engine errors to HTTP responses with stable error codes. Disk-full
//! admission refusals surface with the wire status `STATUS_DISK_FULL` and
//! 503, so clients can distinguish backpressure from bad requests.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;
use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

fn storage_code(err: &StorageError) -> (StatusCode, &'static str) {
    match err {
        StorageError::DiskFull(_) => (StatusCode::SERVICE_UNAVAILABLE, "STATUS_DISK_FULL"),
        StorageError::UnknownGroup(_) => (StatusCode::NOT_FOUND, "GROUP_NOT_FOUND"),
        StorageError::UnknownResource(_) => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
        StorageError::SchemaMismatch(_)
        | StorageError::BadTimestamp(_)
        | StorageError::BadSeries(_)
        | StorageError::NoTagFamily(_)
        | StorageError::InvalidTimeRange => (StatusCode::BAD_REQUEST, "INVALID_WRITE"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Query(e) => match e {
                QueryError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_QUERY"),
                QueryError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "QUERY_CANCELLED"),
                QueryError::Storage(se) => storage_code(se),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "QUERY_ERROR"),
            },
            ApiError::Storage(e) => storage_code(e),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_maps_to_503() {
        let (status, code) = storage_code(&StorageError::DiskFull("x".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "STATUS_DISK_FULL");
    }

    #[test]
    fn test_unknown_lookups_map_to_404() {
        let (status, _) = storage_code(&StorageError::UnknownGroup("g".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = storage_code(&StorageError::UnknownResource("r".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_event_fatal_errors_map_to_400() {
        let (status, _) = storage_code(&StorageError::BadTimestamp(0));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
