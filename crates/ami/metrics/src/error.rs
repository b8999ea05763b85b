//! Error types for ami-metrics

use thiserror::Error;

/// Metric accumulation and export errors
#[derive(Debug, Error)]
pub enum MetricError {
    /// Metric was used before being registered
    #[error("metric {metric} used before registration")]
    Uninitialized { metric: String },

    /// Metric was registered twice
    #[error("metric {metric} is already registered")]
    AlreadyInitialized { metric: String },

    /// Error from the prometheus client
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Exposition output could not be produced
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for metric operations
pub type MetricResult<T> = Result<T, MetricError>;
