use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;

use crate::Result;

/// Default time-to-live of a cached order.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache key under which an order aggregate is stored.
pub fn order_key(id: OrderId) -> String {
    format!("order:{id}")
}

/// Byte-oriented key/value store with per-key expiry.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Returns the value for `key`, or None on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}
