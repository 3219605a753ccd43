//! In-process event bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cache::CacheAdapter;
use common::{EventId, OrderId};
use domain::{EventPublisher, KeyedLock, OrderEvent};
use futures_util::future::join_all;
use order_store::HistoryStore;

use crate::ProjectionError;
use crate::subscriptions::Subscriptions;

/// Gauge reporting how many orders currently have a dispatch in flight.
pub const BUS_LOCKS_GAUGE: &str = "event_bus_locks_active";

/// The result of one handler for one event.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub elapsed: Duration,
    pub result: Result<(), ProjectionError>,
}

impl HandlerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-handler outcomes of one dispatched event.
#[derive(Debug)]
pub struct PublishReport {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub event_type: &'static str,
    pub outcomes: Vec<HandlerOutcome>,
}

impl PublishReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(HandlerOutcome::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_ok())
    }

    /// Returns the outcome of the handler called `name`.
    pub fn outcome(&self, name: &str) -> Option<&HandlerOutcome> {
        self.outcomes.iter().find(|outcome| outcome.handler == name)
    }
}

/// Delivers order events to their subscribed handlers.
///
/// Each handler runs in its own task; `dispatch` returns once all of them
/// have finished. A failing or panicking handler affects only its own
/// outcome. Dispatches for the same order are serialized, so every handler
/// sees one order's events in publish order.
pub struct EventBus<C, H> {
    subscriptions: Arc<Subscriptions<C, H>>,
    in_flight: KeyedLock<OrderId>,
}

impl<C, H> Clone for EventBus<C, H> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: Arc::clone(&self.subscriptions),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<C, H> EventBus<C, H>
where
    C: CacheAdapter + 'static,
    H: HistoryStore + 'static,
{
    pub fn new(subscriptions: Subscriptions<C, H>) -> Self {
        Self {
            subscriptions: Arc::new(subscriptions),
            in_flight: KeyedLock::with_gauge(BUS_LOCKS_GAUGE),
        }
    }

    pub fn subscriptions(&self) -> &Subscriptions<C, H> {
        &self.subscriptions
    }

    /// Runs every handler subscribed to the event's kind and reports how
    /// each one fared.
    #[tracing::instrument(
        skip(self, event),
        fields(event_id = %event.event_id, order_id = %event.order_id, event_type = event.event_type())
    )]
    pub async fn dispatch(&self, event: OrderEvent) -> PublishReport {
        let _in_flight = self.in_flight.lock(event.order_id).await;

        let event_type = event.event_type();
        metrics::counter!("events_published_total", "event_type" => event_type).increment(1);

        let event = Arc::new(event);
        let tasks = self
            .subscriptions
            .handlers_for(event.kind())
            .iter()
            .map(|handler| {
                let name = handler.name();
                let handler = Arc::clone(handler);
                let event = Arc::clone(&event);
                let task = tokio::spawn(async move {
                    let started = Instant::now();
                    let result = handler.handle(&event).await;
                    (result, started.elapsed())
                });
                async move { (name, task.await) }
            });

        let outcomes = join_all(tasks)
            .await
            .into_iter()
            .map(|(handler, joined)| {
                let (result, elapsed) = joined.unwrap_or_else(|e| {
                    (Err(ProjectionError::TaskFailed(e.to_string())), Duration::ZERO)
                });
                metrics::histogram!("projection_handler_duration_seconds", "handler" => handler)
                    .record(elapsed.as_secs_f64());

                if let Err(e) = &result {
                    metrics::counter!("projection_handler_failures_total", "handler" => handler)
                        .increment(1);
                    // The serialized event is enough to replay the handler by hand.
                    let payload = serde_json::to_string(&*event)
                        .unwrap_or_else(|se| format!("<unserializable event: {se}>"));
                    tracing::error!(handler, error = %e, event = %payload, "projection handler failed");
                } else {
                    tracing::debug!(handler, elapsed_ms = elapsed.as_millis() as u64, "projection handler done");
                }

                HandlerOutcome {
                    handler,
                    elapsed,
                    result,
                }
            })
            .collect();

        PublishReport {
            event_id: event.event_id,
            order_id: event.order_id,
            event_type,
            outcomes,
        }
    }
}

#[async_trait]
impl<C, H> EventPublisher for EventBus<C, H>
where
    C: CacheAdapter + 'static,
    H: HistoryStore + 'static,
{
    async fn publish(&self, event: OrderEvent) {
        let report = self.dispatch(event).await;
        if !report.all_succeeded() {
            tracing::warn!(
                event_id = %report.event_id,
                failed = report.failures().count(),
                "event delivered with handler failures"
            );
        }
    }
}
