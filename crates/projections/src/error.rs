//! Projection error types.

use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Reading from the store or decoding a stored payload failed.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
