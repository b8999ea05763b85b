//! Error types for ami-protocol.

use thiserror::Error;

/// Transport and framing errors raised by an AMI connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// TCP connect failed.
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect or greeting did not complete in time.
    #[error("connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    /// The peer did not greet like an Asterisk manager.
    #[error("unexpected banner: {0}")]
    UnexpectedBanner(String),

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// The connection was closed while waiting.
    #[error("connection closed")]
    ConnectionClosed,

    /// IO error on an established connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
