//! Projection error types.

use cache::CacheError;
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while a projection handles an event.
///
/// These never reach the publisher; the bus logs and counts them.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The cache rejected a write or delete.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The history store rejected an append.
    #[error("History error: {0}")]
    History(#[from] StoreError),

    /// The event could not be serialized for the projection.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The handler task panicked or was cancelled.
    #[error("Handler task failed: {0}")]
    TaskFailed(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
