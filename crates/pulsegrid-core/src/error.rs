//! Validation and lookup errors shared across the pipeline.

use thiserror::Error;

/// Errors raised while validating, parsing, or looking up metrics.
///
/// Every variant maps to a fixed HTTP status at the server boundary:
/// `MetricNotFound` becomes 404, the rest become 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("invalid metric type")]
    InvalidMetricType,

    #[error("invalid metric value")]
    InvalidMetricValue,

    #[error("metric value is required for its type")]
    InvalidMetricDelta,

    #[error("metric id is required")]
    InvalidMetricId,

    #[error("invalid JSON payload")]
    InvalidJson,

    #[error("metric not found")]
    MetricNotFound,
}
