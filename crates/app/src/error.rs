//! Start-up error types.

use thiserror::Error;

/// Errors raised while bringing the process up.
#[derive(Debug, Error)]
pub enum AppError {
    /// The database could not be reached.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The cache pool could not be built.
    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    /// The order store failed its health check.
    #[error("Store error: {0}")]
    Store(#[from] order_store::StoreError),

    /// Logging or metrics could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Result type for start-up operations.
pub type Result<T> = std::result::Result<T, AppError>;
