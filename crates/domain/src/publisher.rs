//! Outbound seam for committed order events.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::order::OrderEvent;

/// Receives events after their mutation has committed.
///
/// Publishing cannot fail from the caller's point of view: subscriber
/// failures are handled on the subscriber side.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: OrderEvent);
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: OrderEvent) {
        (**self).publish(event).await
    }
}

/// Publisher that keeps every event in memory, for tests and benchmarks.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the published events in publish order.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: OrderEvent) {
        self.events.lock().push(event);
    }
}
