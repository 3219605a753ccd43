//! Static event-kind to handler routing.

use std::collections::HashMap;
use std::sync::Arc;

use domain::EventKind;

use crate::handler::ProjectionHandler;

/// Handlers per event kind, in subscription order.
///
/// Built once at start-up with [`SubscriptionsBuilder`] and immutable after.
pub struct Subscriptions<C, H> {
    routes: HashMap<EventKind, Vec<Arc<ProjectionHandler<C, H>>>>,
}

impl<C, H> Subscriptions<C, H> {
    pub fn builder() -> SubscriptionsBuilder<C, H> {
        SubscriptionsBuilder {
            routes: HashMap::new(),
        }
    }

    /// Subscribes every handler to every event kind.
    pub fn all_kinds(handlers: impl IntoIterator<Item = ProjectionHandler<C, H>>) -> Self {
        let mut builder = Self::builder();
        for handler in handlers {
            builder = builder.subscribe_all(Arc::new(handler));
        }
        builder.build()
    }

    /// Returns the handlers subscribed to `kind`.
    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<ProjectionHandler<C, H>>] {
        self.routes.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total number of (kind, handler) routes.
    pub fn route_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }
}

/// Collects subscriptions before the bus starts.
pub struct SubscriptionsBuilder<C, H> {
    routes: HashMap<EventKind, Vec<Arc<ProjectionHandler<C, H>>>>,
}

impl<C, H> SubscriptionsBuilder<C, H> {
    /// Routes events of `kind` to `handler`.
    pub fn subscribe(mut self, kind: EventKind, handler: Arc<ProjectionHandler<C, H>>) -> Self {
        self.routes.entry(kind).or_default().push(handler);
        self
    }

    /// Routes every event kind to `handler`.
    pub fn subscribe_all(self, handler: Arc<ProjectionHandler<C, H>>) -> Self {
        EventKind::ALL
            .into_iter()
            .fold(self, |builder, kind| builder.subscribe(kind, Arc::clone(&handler)))
    }

    pub fn build(self) -> Subscriptions<C, H> {
        Subscriptions {
            routes: self.routes,
        }
    }
}
