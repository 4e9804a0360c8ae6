//! Storage engine error types
//!
//! Event-fatal kinds (`SchemaMismatch`, `BadTimestamp`, `UnknownGroup`,
//! `UnknownResource`, `BadSeries`, `NoTagFamily`) fail one write event and
//! leave the rest of the batch running. Batch-fatal kinds (`DiskFull`, `Io`)
//! abandon the affected group's staged buffers.

use thiserror::Error;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Tag/field type unknown or count exceeds schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Timestamp outside the accepted epoch window
    #[error("Invalid timestamp: {0}")]
    BadTimestamp(i64),

    /// Group is not registered
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Measure/stream is not registered in its group
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Series marshalling failed
    #[error("Invalid series: {0}")]
    BadSeries(String),

    /// Write event carried no tag families
    #[error("No tag family: {0}")]
    NoTagFamily(String),

    /// Admission refused: disk usage above the configured watermark
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Invalid time range (start >= end)
    #[error("Invalid time range: start must be less than end")]
    InvalidTimeRange,
}

impl StorageError {
    /// Wire status string for errors that surface to clients with one.
    pub fn status(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull(_) => Some("STATUS_DISK_FULL"),
            _ => None,
        }
    }

    /// Whether this error fails a single event rather than the whole batch.
    pub fn is_event_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::SchemaMismatch(_)
                | StorageError::BadTimestamp(_)
                | StorageError::UnknownGroup(_)
                | StorageError::UnknownResource(_)
                | StorageError::BadSeries(_)
                | StorageError::NoTagFamily(_)
        )
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::UnknownGroup("metrics".to_string());
        assert_eq!(err.to_string(), "Unknown group: metrics");

        let err = StorageError::BadTimestamp(i64::MAX);
        assert!(err.to_string().contains("Invalid timestamp"));
    }

    #[test]
    fn test_disk_full_status() {
        let err = StorageError::DiskFull("usage 97% over 95%".to_string());
        assert_eq!(err.status(), Some("STATUS_DISK_FULL"));
        assert!(StorageError::InvalidTimeRange.status().is_none());
    }

    #[test]
    fn test_event_fatal_classification() {
        assert!(StorageError::BadTimestamp(0).is_event_fatal());
        assert!(StorageError::SchemaMismatch("x".into()).is_event_fatal());
        assert!(!StorageError::DiskFull("x".into()).is_event_fatal());
        let io_err: StorageError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(!io_err.is_event_fatal());
    }
}
