//! Order lifecycle events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CustomerId, EventId, OrderAggregate, OrderId};
use order_store::HistoryAction;
use serde::{Deserialize, Serialize};

/// The subscription key of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    OrderCreated,
    OrderUpdated,
    OrderDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::OrderCreated,
        EventKind::OrderUpdated,
        EventKind::OrderDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "OrderCreated",
            EventKind::OrderUpdated => "OrderUpdated",
            EventKind::OrderDeleted => "OrderDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed field of an updated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Changed fields keyed by their serialized name.
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Computes the top-level fields whose serialized value differs between two
/// snapshots of the same order.
pub fn diff_orders(before: &OrderAggregate, after: &OrderAggregate) -> FieldChanges {
    let (Ok(serde_json::Value::Object(old)), Ok(serde_json::Value::Object(new))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return FieldChanges::new();
    };

    new.into_iter()
        .filter_map(|(field, to)| match old.get(&field) {
            Some(from) if *from != to => Some((
                field,
                FieldChange {
                    from: from.clone(),
                    to,
                },
            )),
            _ => None,
        })
        .collect()
}

/// Payload for OrderCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    /// The committed order.
    pub order: OrderAggregate,
}

/// Payload for OrderUpdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedData {
    pub before: OrderAggregate,
    pub after: OrderAggregate,
    pub changes: FieldChanges,
}

/// Payload for OrderDeleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeletedData {
    /// Last committed state before deletion.
    pub snapshot: OrderAggregate,
}

/// What happened to the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEventData {
    OrderCreated(OrderCreatedData),
    OrderUpdated(OrderUpdatedData),
    OrderDeleted(OrderDeletedData),
}

/// A committed order mutation, published after the store transaction.
///
/// Events are transient; the history projection is what persists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    /// Principal who triggered the mutation.
    pub actor_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
    pub payload: OrderEventData,
}

impl OrderEvent {
    fn new(order_id: OrderId, actor_id: CustomerId, payload: OrderEventData) -> Self {
        Self {
            event_id: EventId::new(),
            order_id,
            actor_id,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn created(order: OrderAggregate, actor_id: CustomerId) -> Self {
        Self::new(
            order.id,
            actor_id,
            OrderEventData::OrderCreated(OrderCreatedData { order }),
        )
    }

    /// Builds an update event; the diff is computed from the two snapshots.
    pub fn updated(before: OrderAggregate, after: OrderAggregate, actor_id: CustomerId) -> Self {
        let changes = diff_orders(&before, &after);
        Self::new(
            after.id,
            actor_id,
            OrderEventData::OrderUpdated(OrderUpdatedData {
                before,
                after,
                changes,
            }),
        )
    }

    pub fn deleted(snapshot: OrderAggregate, actor_id: CustomerId) -> Self {
        Self::new(
            snapshot.id,
            actor_id,
            OrderEventData::OrderDeleted(OrderDeletedData { snapshot }),
        )
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            OrderEventData::OrderCreated(_) => EventKind::OrderCreated,
            OrderEventData::OrderUpdated(_) => EventKind::OrderUpdated,
            OrderEventData::OrderDeleted(_) => EventKind::OrderDeleted,
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The history action recorded for this event.
    pub fn action(&self) -> HistoryAction {
        match self.payload {
            OrderEventData::OrderCreated(_) => HistoryAction::Created,
            OrderEventData::OrderUpdated(_) => HistoryAction::Updated,
            OrderEventData::OrderDeleted(_) => HistoryAction::Deleted,
        }
    }

    /// The order state after the mutation, or None once deleted.
    pub fn current_state(&self) -> Option<&OrderAggregate> {
        match &self.payload {
            OrderEventData::OrderCreated(data) => Some(&data.order),
            OrderEventData::OrderUpdated(data) => Some(&data.after),
            OrderEventData::OrderDeleted(_) => None,
        }
    }

    /// Change payload for the audit log: the full snapshot for created and
    /// deleted orders, the field diff for updates.
    pub fn changes(&self) -> serde_json::Result<serde_json::Value> {
        match &self.payload {
            OrderEventData::OrderCreated(data) => serde_json::to_value(&data.order),
            OrderEventData::OrderUpdated(data) => serde_json::to_value(&data.changes),
            OrderEventData::OrderDeleted(data) => serde_json::to_value(&data.snapshot),
        }
    }
}
