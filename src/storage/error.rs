//! Error types for storage operations

use std::fmt;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while persisting a record
#[derive(Debug)]
pub enum StorageError {
    /// Backend could not be reached
    ConnectionFailed(String),

    /// Backend answered with a non-success status
    Rejected { status: u16, body: String },

    /// Backend answered with success but without a usable acknowledgement
    EmptyAcknowledgement { status: u16, body: String },

    /// Record serialization error
    SerializationError(String),

    /// Invalid configuration (bad endpoint, bad token header)
    InvalidConfig(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to reach storage backend: {}", msg)
            }
            StorageError::Rejected { status, body } => {
                write!(f, "backend rejected record with status {status}: {body}")
            }
            StorageError::EmptyAcknowledgement { status, body } => {
                write!(
                    f,
                    "storage backend did not acknowledge record (status {}): {}",
                    status,
                    if body.is_empty() { "<empty body>" } else { body }
                )
            }
            StorageError::SerializationError(msg) => {
                write!(f, "record serialization error: {}", msg)
            }
            StorageError::InvalidConfig(msg) => write!(f, "invalid storage configuration: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            StorageError::InvalidConfig(err.to_string())
        } else {
            StorageError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
