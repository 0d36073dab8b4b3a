//! Error types for the discovery engine

use thiserror::Error;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Queue index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Invalid operation on the queue state machine
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Collaborator (history/catalogue/snapshot) failure
    #[error(transparent)]
    Core(#[from] cadenza_core::CadenzaError),

    /// Scoring task failed to join
    #[error("Scoring task failed: {0}")]
    TaskFailed(String),
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
