/// Core error types for Cadenza
use crate::types::TrackId;
use thiserror::Error;

/// Result type alias using `CadenzaError`
pub type Result<T> = std::result::Result<T, CadenzaError>;

/// Core error type for Cadenza
#[derive(Error, Debug)]
pub enum CadenzaError {
    /// Storage-related errors (history, catalogue, snapshots)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Track not found in the catalogue
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CadenzaError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
