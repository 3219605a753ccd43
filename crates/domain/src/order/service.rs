//! Order mutation service: the public operations of the order core.

use std::sync::Arc;
use std::time::Duration;

use cache::{CacheAdapter, CacheError, DEFAULT_TTL, order_key};
use chrono::Utc;
use common::{CustomerId, OrderAggregate, OrderId, Page, PageRequest};
use order_store::OrderStore;
use tracing::{debug, error, info, warn};

use crate::error::{DomainError, Result};
use crate::guard::{GuardKey, KeyedGuard, KeyedLock};
use crate::publisher::EventPublisher;

use super::{CreateOrderInput, OrderEvent, OrderPatch, validate_for_create, validate_for_update};

/// Service for managing orders.
///
/// Writes are serialized per key through a [`KeyedLock`]: creates on the
/// customer, updates and deletes on the order. Each write commits to the
/// store before its event is published, and the guard is held until
/// publishing returns so events of one order leave in commit order.
///
/// Once a write has committed, cache invalidation and publishing run on
/// their own task and finish even if the caller stops waiting.
///
/// The cache is consulted on reads and invalidated after writes. A read that
/// misses fills the cache under the order's guard. Any cache failure
/// degrades to the store.
pub struct OrderService<S, C, P> {
    store: S,
    cache: Arc<C>,
    publisher: Arc<P>,
    locks: KeyedLock<GuardKey>,
    cache_ttl: Duration,
}

impl<S, C, P> OrderService<S, C, P>
where
    S: OrderStore,
    C: CacheAdapter + 'static,
    P: EventPublisher + 'static,
{
    /// Creates a new order service.
    pub fn new(store: S, cache: C, publisher: P) -> Self {
        Self {
            store,
            cache: Arc::new(cache),
            publisher: Arc::new(publisher),
            locks: KeyedLock::new(),
            cache_ttl: DEFAULT_TTL,
        }
    }

    /// Sets the TTL used when a read populates the cache.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn locks(&self) -> &KeyedLock<GuardKey> {
        &self.locks
    }

    /// Validates and persists a new order owned by `customer_id`.
    #[tracing::instrument(skip(self, input))]
    pub async fn create(
        &self,
        customer_id: CustomerId,
        input: CreateOrderInput,
    ) -> Result<OrderAggregate> {
        let guard = self.locks.lock(GuardKey::Customer(customer_id)).await;

        let new_order = validate_for_create(customer_id, &input, Utc::now())?;
        let order = self.store.create_order(new_order).await?;

        metrics::counter!("orders_created_total").increment(1);
        info!(order_id = %order.id, total_amount = %order.total_amount, "order created");

        self.after_commit(guard, None, OrderEvent::created(order.clone(), customer_id))
            .await;

        Ok(order)
    }

    /// Returns an order owned by `customer_id`, from the cache when possible.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId, customer_id: CustomerId) -> Result<OrderAggregate> {
        if let Some(order) = self.cached(order_id).await {
            // Ownership never changes, so a cached owner is authoritative.
            ensure_owner(&order, customer_id)?;
            return Ok(order);
        }

        // No write can commit between the store read and the cache fill.
        let _guard = self.locks.lock(GuardKey::Order(order_id)).await;
        let order = self.load_owned(order_id, customer_id).await?;
        self.populate(&order).await;
        Ok(order)
    }

    /// Applies `patch` to an order owned by `customer_id`.
    #[tracing::instrument(skip(self))]
    pub async fn update(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        patch: OrderPatch,
    ) -> Result<OrderAggregate> {
        let guard = self.locks.lock(GuardKey::Order(order_id)).await;

        let current = self.load_owned(order_id, customer_id).await?;
        let candidate = validate_for_update(&current, &patch)?;

        let status = candidate.status;
        let total_amount = candidate.total_amount;
        let updated = self
            .store
            .update_order(order_id, move |order| {
                order.status = status;
                order.total_amount = total_amount;
            })
            .await?;

        metrics::counter!("orders_updated_total").increment(1);
        info!(from = %current.status, to = %updated.status, "order updated");

        self.after_commit(
            guard,
            Some(order_id),
            OrderEvent::updated(current, updated.clone(), customer_id),
        )
        .await;

        Ok(updated)
    }

    /// Deletes an order owned by `customer_id` together with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, order_id: OrderId, customer_id: CustomerId) -> Result<()> {
        let guard = self.locks.lock(GuardKey::Order(order_id)).await;

        let snapshot = self.load_owned(order_id, customer_id).await?;
        self.store.delete_order(order_id).await?;

        metrics::counter!("orders_deleted_total").increment(1);
        info!("order deleted");

        self.after_commit(
            guard,
            Some(order_id),
            OrderEvent::deleted(snapshot, customer_id),
        )
        .await;

        Ok(())
    }

    /// Lists the customer's orders, newest first.
    ///
    /// `page` is 1-based; `size` is clamped to `1..=100`.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        customer_id: CustomerId,
        page: u32,
        size: u32,
    ) -> Result<Page<OrderAggregate>> {
        let request = PageRequest::new(page, size);
        let (items, total) = self.store.list_orders(customer_id, request).await?;

        debug!(returned = items.len(), total, "orders listed");
        Ok(Page::new(items, total, request))
    }

    /// Invalidates `stale` and publishes `event` on a detached task that owns
    /// `guard`, then waits for it.
    async fn after_commit(
        &self,
        guard: KeyedGuard<GuardKey>,
        stale: Option<OrderId>,
        event: OrderEvent,
    ) {
        let cache = Arc::clone(&self.cache);
        let publisher = Arc::clone(&self.publisher);
        let event_id = event.event_id;

        let task = tokio::spawn(async move {
            if let Some(order_id) = stale {
                evict(cache.as_ref(), &order_key(order_id)).await;
            }
            publisher.publish(event).await;
            drop(guard);
        });

        if let Err(e) = task.await {
            error!(%event_id, error = %e, "post-commit task failed");
        }
    }

    async fn load_owned(&self, order_id: OrderId, customer_id: CustomerId) -> Result<OrderAggregate> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(DomainError::NotFound(order_id))?;
        ensure_owner(&order, customer_id)?;
        Ok(order)
    }

    async fn cached(&self, order_id: OrderId) -> Option<OrderAggregate> {
        let key = order_key(order_id);
        let bytes = match self.cache.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                metrics::counter!("order_cache_misses_total").increment(1);
                return None;
            }
            Err(e) => {
                metrics::counter!("order_cache_errors_total").increment(1);
                warn!(key, error = %e, "cache read failed, using store");
                return None;
            }
        };

        match decode(&bytes) {
            Ok(order) if order.id == order_id => {
                metrics::counter!("order_cache_hits_total").increment(1);
                Some(order)
            }
            Ok(order) => {
                metrics::counter!("order_cache_errors_total").increment(1);
                warn!(key, cached_id = %order.id, "cache entry holds another order, evicting");
                evict(self.cache.as_ref(), &key).await;
                None
            }
            Err(e) => {
                metrics::counter!("order_cache_errors_total").increment(1);
                warn!(key, error = %e, "undecodable cache entry, evicting");
                evict(self.cache.as_ref(), &key).await;
                None
            }
        }
    }

    async fn populate(&self, order: &OrderAggregate) {
        let key = order_key(order.id);
        let written = match encode(order) {
            Ok(bytes) => self.cache.set(&key, bytes, self.cache_ttl).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            metrics::counter!("order_cache_errors_total").increment(1);
            warn!(key, error = %e, "cache write failed");
        }
    }
}

fn encode(order: &OrderAggregate) -> std::result::Result<Vec<u8>, CacheError> {
    serde_json::to_vec(order).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> std::result::Result<OrderAggregate, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}

async fn evict<C: CacheAdapter + ?Sized>(cache: &C, key: &str) {
    if let Err(e) = cache.delete(key).await {
        metrics::counter!("order_cache_errors_total").increment(1);
        warn!(key, error = %e, "cache delete failed");
    }
}

fn ensure_owner(order: &OrderAggregate, customer_id: CustomerId) -> Result<()> {
    if order.is_owned_by(customer_id) {
        Ok(())
    } else {
        Err(DomainError::Forbidden {
            order_id: order.id,
            customer_id,
        })
    }
}
