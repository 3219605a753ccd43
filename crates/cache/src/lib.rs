//! Cache adapter for order projections.
//!
//! The cache holds soft copies of order aggregates under `order:{id}`. It is
//! never authoritative: every failure surfaces as [`CacheError`] so callers
//! can fall back to the store.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod redis_cache;

pub use adapter::{CacheAdapter, DEFAULT_TTL, order_key};
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;
