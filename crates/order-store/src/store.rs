use async_trait::async_trait;

use crate::{CustomerId, NewOrder, OrderAggregate, OrderId, PageRequest, Result};

/// Core trait for durable order storage.
///
/// Header and lines are one unit: every write is transactional, and a reader
/// observes either the state before or after a write, never a partial one.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with its lines in one transaction.
    ///
    /// Assigns the order and line ids and the `created_at`/`updated_at`
    /// timestamps, and returns the committed aggregate.
    async fn create_order(&self, order: NewOrder) -> Result<OrderAggregate>;

    /// Retrieves an order with its lines.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>>;

    /// Transactional read-modify-write of an order.
    ///
    /// The mutator is applied to the current committed state inside the
    /// transaction. Only the header fields `status`, `order_date` and
    /// `total_amount` are persisted; changes to ids, `created_at` or `lines`
    /// are discarded. `updated_at` is advanced to a value strictly greater
    /// than the previous one. Fails with `OrderNotFound` if the order doesn't
    /// exist.
    async fn update_order<F>(&self, id: OrderId, mutator: F) -> Result<OrderAggregate>
    where
        F: FnOnce(&mut OrderAggregate) + Send + 'static;

    /// Deletes an order; its lines are removed with it.
    ///
    /// Fails with `OrderNotFound` if the order doesn't exist.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    /// Lists a customer's orders, newest first, with the customer's total order count.
    async fn list_orders(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<(Vec<OrderAggregate>, u64)>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}
