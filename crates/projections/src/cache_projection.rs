//! Keeps the order cache in step with committed mutations.

use std::time::Duration;

use cache::{CacheAdapter, DEFAULT_TTL, order_key};
use domain::OrderEvent;

use crate::Result;

/// Writes the fresh aggregate on create and update, removes it on delete.
///
/// Failures are returned to the bus and never retried here; the next read
/// repopulates the entry from the store.
pub struct CacheProjection<C> {
    cache: C,
    ttl: Duration,
}

impl<C: CacheAdapter> CacheProjection<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn handle(&self, event: &OrderEvent) -> Result<()> {
        let key = order_key(event.order_id);
        match event.current_state() {
            Some(order) => {
                let bytes = serde_json::to_vec(order)?;
                self.cache.set(&key, bytes, self.ttl).await?;
                tracing::debug!(key, "cache entry refreshed");
            }
            None => {
                self.cache.delete(&key).await?;
                tracing::debug!(key, "cache entry removed");
            }
        }
        Ok(())
    }
}
