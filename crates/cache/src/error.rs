use thiserror::Error;

/// Errors reported by a cache adapter.
///
/// Callers treat every variant as a soft failure: the cache is an
/// optimization and the store stays authoritative.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend could not be reached or rejected the command.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A cached payload could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
