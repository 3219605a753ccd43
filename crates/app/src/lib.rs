//! Process wiring for the order lifecycle core.
//!
//! Builds the [`OrderService`] on top of the durable store, the cache and the
//! event bus with its cache and history projections, and connects the
//! PostgreSQL and Redis adapters from [`Config`].

pub mod config;
pub mod error;
pub mod telemetry;

use std::time::Duration;

use cache::{CacheAdapter, RedisCache};
use domain::OrderService;
use order_store::{HistoryStore, OrderStore, PostgresOrderStore};
use projections::{CacheProjection, EventBus, HistoryProjection, Subscriptions};
use sqlx::postgres::PgPoolOptions;

pub use config::{Config, LogFormat};
pub use error::{AppError, Result};

/// The event bus wired with the cache and history projections.
pub type OrderBus<C, H> = EventBus<C, H>;

/// The fully wired order service.
pub type OrderCore<S, C, H> = OrderService<S, C, OrderBus<C, H>>;

/// Builds the event bus with both projections subscribed to every event kind.
pub fn build_bus<C, H>(cache: C, history: H, cache_ttl: Duration) -> OrderBus<C, H>
where
    C: CacheAdapter + 'static,
    H: HistoryStore + 'static,
{
    EventBus::new(Subscriptions::all_kinds([
        CacheProjection::new(cache).with_ttl(cache_ttl).into(),
        HistoryProjection::new(history).into(),
    ]))
}

/// Builds the order service publishing into a freshly wired bus.
///
/// The service and the cache projection share `cache`, so reads see what the
/// projection writes.
pub fn build_order_core<S, C, H>(
    store: S,
    cache: C,
    history: H,
    cache_ttl: Duration,
) -> OrderCore<S, C, H>
where
    S: OrderStore,
    C: CacheAdapter + Clone + 'static,
    H: HistoryStore + 'static,
{
    let bus = build_bus(cache.clone(), history, cache_ttl);
    OrderService::new(store, cache, bus).with_cache_ttl(cache_ttl)
}

/// External adapters the process runs against.
pub struct Adapters {
    pub store: PostgresOrderStore,
    pub cache: RedisCache,
}

/// Connects to PostgreSQL and Redis and brings the schema up to date.
///
/// The database must be reachable. An unreachable cache is only logged since
/// reads fall back to the store.
pub async fn connect(config: &Config) -> Result<Adapters> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    let store = PostgresOrderStore::new(pool);
    store.run_migrations().await?;
    store.ping().await?;
    tracing::info!("database connected, migrations applied");

    let cache = RedisCache::from_url(&config.redis_url)?;
    match cache.ping().await {
        Ok(()) => tracing::info!("cache connected"),
        Err(e) => tracing::warn!(error = %e, "cache unavailable at start-up, continuing"),
    }

    Ok(Adapters { store, cache })
}
