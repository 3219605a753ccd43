//! Integration tests for the order mutation service.
//!
//! These run the service against the in-memory store and cache, with a
//! recording publisher standing in for the event bus.

use std::sync::Arc;

use cache::{InMemoryCache, order_key};
use chrono::{Duration, Utc};
use common::{CustomerId, Money, OrderId, OrderStatus};
use domain::{
    CreateOrderInput, DomainError, EventKind, LineInput, OrderEventData, OrderPatch, OrderService,
    RecordingPublisher,
};
use order_store::{InMemoryOrderStore, OrderStore, StoreError};

type Service = OrderService<InMemoryOrderStore, InMemoryCache, RecordingPublisher>;

fn create_service() -> Service {
    OrderService::new(
        InMemoryOrderStore::new(),
        InMemoryCache::new(),
        RecordingPublisher::new(),
    )
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn sample_input() -> CreateOrderInput {
    CreateOrderInput {
        order_date: Utc::now() - Duration::hours(1),
        status: None,
        lines: vec![
            LineInput::new(1001, 2, money("25.50")),
            LineInput::new(1002, 1, money("15.00")),
        ],
    }
}

const OWNER: CustomerId = CustomerId::new(123);
const STRANGER: CustomerId = CustomerId::new(456);

mod create {
    use super::*;

    #[tokio::test]
    async fn total_is_sum_of_lines() {
        let service = create_service();

        let order = service.create(OWNER, sample_input()).await.unwrap();

        assert_eq!(order.total_amount, money("66.00"));
        assert_eq!(order.total_amount, order.computed_total());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_id, OWNER);
        assert_eq!(order.lines.len(), 2);
    }

    #[tokio::test]
    async fn publishes_created_event_after_commit() {
        let service = create_service();

        let order = service.create(OWNER, sample_input()).await.unwrap();

        let events = service.publisher().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::OrderCreated);
        assert_eq!(events[0].actor_id, OWNER);
        assert_eq!(events[0].current_state(), Some(&order));
    }

    #[tokio::test]
    async fn invalid_input_reports_every_field() {
        let service = create_service();
        let mut input = sample_input();
        input.order_date = Utc::now() + Duration::days(2);
        input.lines[1].quantity = 0;

        let err = service.create(OWNER, input).await.unwrap_err();
        let DomainError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(validation.fields(), vec!["order_date", "lines[1].quantity"]);
        assert!(service.publisher().is_empty());
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_publishes_nothing() {
        let service = create_service();
        service.store().fail_next_writes(1);

        let err = service.create(OWNER, sample_input()).await.unwrap_err();
        assert!(matches!(err, DomainError::Store(StoreError::Unavailable(_))));
        assert_eq!(service.store().order_count().await, 0);
        assert!(service.publisher().is_empty());
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn get_after_create_returns_same_aggregate() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        // First read misses the cache, second hits it.
        assert_eq!(service.get(created.id, OWNER).await.unwrap(), created);
        assert_eq!(service.get(created.id, OWNER).await.unwrap(), created);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let service = create_service();

        let err = service.get(OrderId::new(77), OWNER).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(id) if id == OrderId::new(77)));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let service = create_service();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(service.create(OWNER, sample_input()).await.unwrap().id);
        }
        service.create(STRANGER, sample_input()).await.unwrap();

        let page = service.list(OWNER, 1, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(
            page.items.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );
        assert!(page.has_next);
        assert!(!page.has_prev);

        let page = service.list(OWNER, 2, 2).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[tokio::test]
    async fn list_clamps_page_and_size() {
        let service = create_service();
        service.create(OWNER, sample_input()).await.unwrap();

        let page = service.list(OWNER, 0, 0).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 1);
        assert_eq!(page.items.len(), 1);

        let page = service.list(OWNER, 1, 1000).await.unwrap();
        assert_eq!(page.size, 100);
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn status_change_advances_updated_at() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();
        service.get(created.id, OWNER).await.unwrap();

        let updated = service
            .update(created.id, OWNER, OrderPatch::status("SHIPPED"))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(updated.total_amount, money("66.00"));

        let fetched = service.get(created.id, OWNER).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Shipped);
        assert!(fetched.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn publishes_before_after_and_diff() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        service
            .update(created.id, OWNER, OrderPatch::status("CANCELLED"))
            .await
            .unwrap();

        let events = service.publisher().events();
        let OrderEventData::OrderUpdated(data) = &events[1].payload else {
            panic!("expected update event");
        };
        assert_eq!(data.before, created);
        assert_eq!(data.after.status, OrderStatus::Cancelled);
        assert_eq!(data.changes["status"].from, "PENDING");
        assert_eq!(data.changes["status"].to, "CANCELLED");
        assert!(data.changes.contains_key("updated_at"));
        assert!(!data.changes.contains_key("lines"));
    }

    #[tokio::test]
    async fn invalid_status_changes_nothing() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let err = service
            .update(created.id, OWNER, OrderPatch::status("RETURNED"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref v) if v.has_field("status")));

        let stored = service.store().get_order(created.id).await.unwrap().unwrap();
        assert_eq!(stored, created);
        assert_eq!(service.publisher().len(), 1);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let service = create_service();

        let err = service
            .update(OrderId::new(5), OWNER, OrderPatch::status("SHIPPED"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let service = Arc::new(create_service());
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let mut handles = Vec::new();
        for status in ["SHIPPED", "CANCELLED", "PENDING", "SHIPPED"] {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .update(created.id, OWNER, OrderPatch::status(status))
                    .await
                    .unwrap()
            }));
        }
        let results = futures_util::future::join_all(handles).await;
        assert!(results.iter().all(Result::is_ok));

        // Each update saw the state the previous one committed.
        let events = service.publisher().events();
        let updates: Vec<_> = events
            .iter()
            .filter_map(|event| match &event.payload {
                OrderEventData::OrderUpdated(data) => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 4);
        for pair in updates.windows(2) {
            assert_eq!(pair[1].before, pair[0].after);
            assert!(pair[1].after.updated_at > pair[0].after.updated_at);
        }

        let last = updates[3].after.clone();
        assert_eq!(service.get(created.id, OWNER).await.unwrap(), last);
        assert_eq!(service.locks().active_keys(), 0);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn deleted_order_is_gone_from_get_and_list() {
        let service = create_service();
        let kept = service.create(OWNER, sample_input()).await.unwrap();
        let doomed = service.create(OWNER, sample_input()).await.unwrap();
        service.get(doomed.id, OWNER).await.unwrap();

        service.delete(doomed.id, OWNER).await.unwrap();

        let err = service.get(doomed.id, OWNER).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let page = service.list(OWNER, 1, 10).await.unwrap();
        assert_eq!(page.items.iter().map(|o| o.id).collect::<Vec<_>>(), vec![kept.id]);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn publishes_last_snapshot() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        service.delete(created.id, OWNER).await.unwrap();

        let events = service.publisher().events();
        let OrderEventData::OrderDeleted(data) = &events[1].payload else {
            panic!("expected delete event");
        };
        assert_eq!(data.snapshot, created);
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        service.delete(created.id, OWNER).await.unwrap();
        let err = service.delete(created.id, OWNER).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(service.publisher().len(), 2);
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn other_customer_is_forbidden_and_changes_nothing() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let err = service.get(created.id, STRANGER).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Forbidden { order_id, customer_id }
                if order_id == created.id && customer_id == STRANGER
        ));

        let err = service
            .update(created.id, STRANGER, OrderPatch::status("CANCELLED"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));

        let err = service.delete(created.id, STRANGER).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));

        let stored = service.store().get_order(created.id).await.unwrap().unwrap();
        assert_eq!(stored, created);
        assert_eq!(service.publisher().len(), 1);
    }
}

mod cache_degradation {
    use super::*;

    #[tokio::test]
    async fn mutations_and_reads_succeed_while_cache_is_down() {
        let service = create_service();
        service.cache().set_available(false);

        let created = service.create(OWNER, sample_input()).await.unwrap();
        assert_eq!(service.get(created.id, OWNER).await.unwrap(), created);

        let updated = service
            .update(created.id, OWNER, OrderPatch::status("SHIPPED"))
            .await
            .unwrap();
        assert_eq!(service.get(created.id, OWNER).await.unwrap(), updated);

        service.delete(created.id, OWNER).await.unwrap();
        assert!(service.store().get_order(created.id).await.unwrap().is_none());
        assert_eq!(service.publisher().len(), 3);
    }

    #[tokio::test]
    async fn stale_entry_from_outage_is_invalidated_later() {
        let service = create_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();
        service.get(created.id, OWNER).await.unwrap();

        service.cache().set_available(false);
        service
            .update(created.id, OWNER, OrderPatch::status("SHIPPED"))
            .await
            .unwrap();
        service.cache().set_available(true);

        // The outage left the pre-update copy behind; reads serve it until
        // the next successful invalidation.
        assert!(service.cache().contains(&order_key(created.id)));
        service
            .update(created.id, OWNER, OrderPatch::status("CANCELLED"))
            .await
            .unwrap();
        assert!(!service.cache().contains(&order_key(created.id)));
        assert_eq!(
            service.get(created.id, OWNER).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }
}

mod read_write_races {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use order_store::{NewOrder, OrderAggregate, PageRequest};
    use tokio::sync::Notify;

    use super::*;

    /// Store whose first `get_order` after `arm` holds its result until
    /// `release` is notified.
    struct PausingStore {
        inner: InMemoryOrderStore,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    impl PausingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryOrderStore::new(),
                armed: AtomicBool::new(false),
                reached: Notify::new(),
                release: Notify::new(),
            }
        }

        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OrderStore for PausingStore {
        async fn create_order(&self, order: NewOrder) -> order_store::Result<OrderAggregate> {
            self.inner.create_order(order).await
        }

        async fn get_order(&self, id: OrderId) -> order_store::Result<Option<OrderAggregate>> {
            let order = self.inner.get_order(id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            Ok(order)
        }

        async fn update_order<F>(
            &self,
            id: OrderId,
            mutator: F,
        ) -> order_store::Result<OrderAggregate>
        where
            F: FnOnce(&mut OrderAggregate) + Send + 'static,
        {
            self.inner.update_order(id, mutator).await
        }

        async fn delete_order(&self, id: OrderId) -> order_store::Result<()> {
            self.inner.delete_order(id).await
        }

        async fn list_orders(
            &self,
            customer_id: CustomerId,
            page: PageRequest,
        ) -> order_store::Result<(Vec<OrderAggregate>, u64)> {
            self.inner.list_orders(customer_id, page).await
        }

        async fn ping(&self) -> order_store::Result<()> {
            self.inner.ping().await
        }
    }

    type PausingService = OrderService<PausingStore, InMemoryCache, RecordingPublisher>;

    fn pausing_service() -> Arc<PausingService> {
        Arc::new(OrderService::new(
            PausingStore::new(),
            InMemoryCache::new(),
            RecordingPublisher::new(),
        ))
    }

    /// Starts a `get` that stops inside the store read, and waits until it does.
    async fn start_paused_read(
        service: &Arc<PausingService>,
        order_id: OrderId,
    ) -> tokio::task::JoinHandle<domain::Result<OrderAggregate>> {
        service.store().arm();
        let reader = tokio::spawn({
            let service = Arc::clone(service);
            async move { service.get(order_id, OWNER).await }
        });
        service.store().reached.notified().await;
        reader
    }

    #[tokio::test]
    async fn read_overlapping_update_does_not_cache_old_state() {
        let service = pausing_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let reader = start_paused_read(&service, created.id).await;
        let writer = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .update(created.id, OWNER, OrderPatch::status("SHIPPED"))
                    .await
            }
        });
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        service.store().release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap().status, OrderStatus::Pending);
        assert_eq!(writer.await.unwrap().unwrap().status, OrderStatus::Shipped);
        assert_eq!(
            service.get(created.id, OWNER).await.unwrap().status,
            OrderStatus::Shipped
        );
    }

    #[tokio::test]
    async fn read_overlapping_delete_does_not_resurrect_order() {
        let service = pausing_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let reader = start_paused_read(&service, created.id).await;
        let writer = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.delete(created.id, OWNER).await }
        });
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        service.store().release.notify_one();

        reader.await.unwrap().unwrap();
        writer.await.unwrap().unwrap();
        assert!(!service.cache().contains(&order_key(created.id)));
        assert!(matches!(
            service.get(created.id, OWNER).await,
            Err(DomainError::NotFound(id)) if id == created.id
        ));
    }
}

mod abandoned_writes {
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use cache::CacheAdapter;

    use super::*;

    /// Cache whose deletes take `delay`.
    struct SlowEvictCache {
        inner: InMemoryCache,
        delay: StdDuration,
    }

    #[async_trait]
    impl CacheAdapter for SlowEvictCache {
        async fn get(&self, key: &str) -> cache::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: StdDuration) -> cache::Result<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> cache::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(key).await
        }

        async fn ping(&self) -> cache::Result<()> {
            self.inner.ping().await
        }
    }

    fn slow_service() -> OrderService<InMemoryOrderStore, SlowEvictCache, RecordingPublisher> {
        OrderService::new(
            InMemoryOrderStore::new(),
            SlowEvictCache {
                inner: InMemoryCache::new(),
                delay: StdDuration::from_millis(200),
            },
            RecordingPublisher::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn update_dropped_after_commit_still_publishes() {
        let service = slow_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let outcome = tokio::time::timeout(
            StdDuration::from_millis(50),
            service.update(created.id, OWNER, OrderPatch::status("SHIPPED")),
        )
        .await;
        assert!(outcome.is_err());

        let stored = service.store().get_order(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);

        tokio::time::sleep(StdDuration::from_millis(500)).await;
        let kinds: Vec<_> = service
            .publisher()
            .events()
            .iter()
            .map(|event| event.kind())
            .collect();
        assert_eq!(kinds, vec![EventKind::OrderCreated, EventKind::OrderUpdated]);
        assert_eq!(service.locks().active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn next_write_waits_for_abandoned_publish() {
        let service = slow_service();
        let created = service.create(OWNER, sample_input()).await.unwrap();

        let _ = tokio::time::timeout(
            StdDuration::from_millis(50),
            service.update(created.id, OWNER, OrderPatch::status("SHIPPED")),
        )
        .await;
        service.delete(created.id, OWNER).await.unwrap();

        let kinds: Vec<_> = service
            .publisher()
            .events()
            .iter()
            .map(|event| event.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::OrderCreated, EventKind::OrderUpdated, EventKind::OrderDeleted]
        );
    }
}
