//! Error types for ami-session.

use ami_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while establishing or maintaining the manager session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login rejected or not confirmed in time. The process cannot continue.
    #[error("fatal session error: {0}")]
    Fatal(String),

    /// The session stopped answering and must be re-established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Transport error from the underlying connection.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
