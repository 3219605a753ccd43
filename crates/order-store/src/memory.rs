use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{
    CustomerId, HistoryId, LineId, NewOrder, OrderAggregate, OrderId, OrderLine, PageRequest,
    Result, StoreError,
    history::{HistoryRecord, HistoryStore, NewHistoryRecord},
    store::OrderStore,
};

#[derive(Default)]
struct OrderTable {
    orders: BTreeMap<OrderId, OrderAggregate>,
    last_order_id: i64,
    last_line_id: i64,
}

/// In-memory order store implementation for testing.
///
/// This implementation keeps all orders in memory and provides the same
/// interface as the PostgreSQL implementation. Every operation runs under a
/// single table lock, which gives it serializable isolation.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
    failing_writes: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.table.read().await.orders.len()
    }

    /// Makes the next `count` writes fail with `StoreError::Unavailable`
    /// without touching any state.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_write_fault(&self) -> Result<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Unavailable("injected write failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

/// Returns a timestamp strictly after `previous`.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<OrderAggregate> {
        self.check_write_fault()?;

        let mut table = self.table.write().await;
        let now = Utc::now();

        table.last_order_id += 1;
        let id = OrderId::new(table.last_order_id);

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in order.lines {
            table.last_line_id += 1;
            lines.push(OrderLine {
                id: LineId::new(table.last_line_id),
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                created_at: now,
            });
        }

        let aggregate = OrderAggregate {
            id,
            customer_id: order.customer_id,
            order_date: order.order_date,
            status: order.status,
            total_amount: order.total_amount,
            lines,
            created_at: now,
            updated_at: now,
        };
        table.orders.insert(id, aggregate.clone());

        Ok(aggregate)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>> {
        Ok(self.table.read().await.orders.get(&id).cloned())
    }

    async fn update_order<F>(&self, id: OrderId, mutator: F) -> Result<OrderAggregate>
    where
        F: FnOnce(&mut OrderAggregate) + Send + 'static,
    {
        self.check_write_fault()?;

        let mut table = self.table.write().await;
        let current = table
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(id))?;

        // Identity, creation time and lines are immutable.
        let mut next = current.clone();
        mutator(&mut next);
        next.id = current.id;
        next.customer_id = current.customer_id;
        next.created_at = current.created_at;
        next.lines = current.lines;
        next.updated_at = advance(current.updated_at);

        table.orders.insert(id, next.clone());
        Ok(next)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        self.check_write_fault()?;

        let mut table = self.table.write().await;
        table
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn list_orders(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<(Vec<OrderAggregate>, u64)> {
        let table = self.table.read().await;
        let mut owned: Vec<&OrderAggregate> = table
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .collect();

        // Newest first; ids are assigned in creation order.
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.size() as usize)
            .cloned()
            .collect();

        Ok((items, total))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory history log for testing.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<Vec<HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty history log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records across all orders.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns every record in append order.
    pub async fn all(&self) -> Vec<HistoryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.iter().find(|r| r.event_id == record.event_id) {
            return Ok(existing.clone());
        }

        let stored = HistoryRecord {
            id: HistoryId::new(),
            event_id: record.event_id,
            order_id: record.order_id,
            action: record.action,
            changes: record.changes,
            performed_by: record.performed_by,
            created_at: Utc::now(),
        };
        records.push(stored.clone());

        Ok(stored)
    }

    async fn history_for(&self, order_id: OrderId) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventId, HistoryAction, Money, NewOrderLine, OrderStatus, ProductId};

    fn new_order(customer: i64) -> NewOrder {
        NewOrder {
            customer_id: CustomerId::new(customer),
            order_date: Utc::now(),
            status: OrderStatus::Pending,
            total_amount: Money::from_cents(6600),
            lines: vec![
                NewOrderLine {
                    product_id: ProductId::new(1001),
                    quantity: 2,
                    unit_price: Money::from_cents(2550),
                },
                NewOrderLine {
                    product_id: ProductId::new(1002),
                    quantity: 1,
                    unit_price: Money::from_cents(1500),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let store = InMemoryOrderStore::new();

        let first = store.create_order(new_order(1)).await.unwrap();
        let second = store.create_order(new_order(1)).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.lines[0].id, LineId::new(1));
        assert_eq!(second.lines[1].id, LineId::new(4));
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_get_returns_committed_aggregate() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(1)).await.unwrap();

        let loaded = store.get_order(created.id).await.unwrap();
        assert_eq!(loaded, Some(created));
        assert!(store.get_order(OrderId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_advances_updated_at() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(1)).await.unwrap();

        let updated = store
            .update_order(created.id, |o| o.status = OrderStatus::Shipped)
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Shipped);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_cannot_change_identity() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(1)).await.unwrap();

        let updated = store
            .update_order(created.id, |o| {
                o.id = OrderId::new(500);
                o.customer_id = CustomerId::new(2);
            })
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.customer_id, created.customer_id);
    }

    #[tokio::test]
    async fn test_update_discards_line_changes() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(1)).await.unwrap();

        let updated = store
            .update_order(created.id, |o| {
                o.lines.clear();
                o.status = OrderStatus::Cancelled;
            })
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Cancelled);
        assert_eq!(updated.lines, created.lines);
        let stored = store.get_order(created.id).await.unwrap().unwrap();
        assert_eq!(stored.lines, created.lines);
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let store = InMemoryOrderStore::new();
        let err = store
            .update_order(OrderId::new(7), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(id) if id == OrderId::new(7)));
    }

    #[tokio::test]
    async fn test_delete_removes_order() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(1)).await.unwrap();

        store.delete_order(created.id).await.unwrap();

        assert!(store.get_order(created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_order(created.id).await,
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let store = InMemoryOrderStore::new();
        let a1 = store.create_order(new_order(1)).await.unwrap();
        store.create_order(new_order(2)).await.unwrap();
        let a2 = store.create_order(new_order(1)).await.unwrap();
        let a3 = store.create_order(new_order(1)).await.unwrap();

        let (items, total) = store
            .list_orders(CustomerId::new(1), PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            items.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![a3.id, a2.id]
        );

        let (items, _) = store
            .list_orders(CustomerId::new(1), PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(items.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a1.id]);
    }

    #[tokio::test]
    async fn test_injected_write_failure_leaves_no_state() {
        let store = InMemoryOrderStore::new();
        store.fail_next_writes(1);

        let err = store.create_order(new_order(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.order_count().await, 0);

        store.create_order(new_order(1)).await.unwrap();
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_history_append_is_idempotent_per_event() {
        let history = InMemoryHistoryStore::new();
        let record = NewHistoryRecord {
            event_id: EventId::new(),
            order_id: OrderId::new(1),
            action: HistoryAction::Created,
            changes: serde_json::json!({"status": "PENDING"}),
            performed_by: CustomerId::new(123),
        };

        let first = history.append(record.clone()).await.unwrap();
        let second = history.append(record).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(history.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_history_for_keeps_append_order() {
        let history = InMemoryHistoryStore::new();
        for action in [
            HistoryAction::Created,
            HistoryAction::Updated,
            HistoryAction::Deleted,
        ] {
            history
                .append(NewHistoryRecord {
                    event_id: EventId::new(),
                    order_id: OrderId::new(1),
                    action,
                    changes: serde_json::Value::Null,
                    performed_by: CustomerId::new(123),
                })
                .await
                .unwrap();
        }

        let actions: Vec<_> = history
            .history_for(OrderId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                HistoryAction::Created,
                HistoryAction::Updated,
                HistoryAction::Deleted
            ]
        );
        assert!(history.history_for(OrderId::new(2)).await.unwrap().is_empty());
    }
}
