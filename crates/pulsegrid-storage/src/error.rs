//! Error types for metric storage backends.

use thiserror::Error;

use pulsegrid_core::MetricError;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while persisting or reading metrics.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("database error: {0}")]
    Database(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StorageError {
    /// Whether this error is a lookup miss rather than a backend fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Metric(MetricError::MetricNotFound))
    }
}
