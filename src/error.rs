//! Error types for poolfs
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

/// Unified error type for poolfs operations
#[derive(Debug, Error)]
pub enum PoolError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors (connection is dropped, no response is sent)
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Request Errors (answered with an ERROR response)
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Command(String),

    #[error("{0}")]
    Storage(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Client Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// True for errors that mean the peer went away mid-exchange
    pub fn is_disconnect(&self) -> bool {
        match self {
            PoolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
