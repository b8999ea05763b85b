//! Error types for the exporter daemon.

use ami_metrics::MetricError;
use ami_session::SessionError;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level daemon errors
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations
pub type ExporterResult<T> = Result<T, ExporterError>;
