//! Query error types

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while executing a query
#[derive(Error, Debug)]
pub enum QueryError {
    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Request failed validation
    #[error("Invalid query: {0}")]
    InvalidRequest(String),

    /// Cooperative cancellation observed
    #[error("Query cancelled")]
    Cancelled,

    /// Worker task failed outside the query logic itself
    #[error("Internal query error: {0}")]
    Internal(String),

    /// Several workers failed; all causes retained
    #[error("Multiple query errors: [{}]", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<QueryError>),
}

impl QueryError {
    /// Collapse collected worker errors into one. A single error stays
    /// itself; several become `Multiple`.
    pub fn combine(mut errors: Vec<QueryError>) -> QueryError {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            QueryError::Multiple(errors)
        }
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;
