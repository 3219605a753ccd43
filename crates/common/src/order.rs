//! Order aggregate data model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CustomerId, LineId, Money, OrderId, ProductId};

/// The status of an order.
///
/// Transitions are caller-directed: any status may be set by an authorized
/// update, but the value is always one of these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order has been placed and not yet shipped.
    #[default]
    Pending,

    /// Order has left the warehouse.
    Shipped,

    /// Order was cancelled.
    Cancelled,
}

impl OrderStatus {
    /// All valid statuses.
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Shipped,
        OrderStatus::Cancelled,
    ];

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A line item owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Surrogate id assigned by the store.
    pub id: LineId,

    /// The product ordered.
    pub product_id: ProductId,

    /// Quantity ordered, in `[1, 1000]`.
    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,

    /// When the line was created.
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order header together with its lines: one consistency boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAggregate {
    /// Surrogate id assigned by the store.
    pub id: OrderId,

    /// The owning principal.
    pub customer_id: CustomerId,

    /// When the order was placed.
    pub order_date: DateTime<Utc>,

    /// Current status.
    pub status: OrderStatus,

    /// Sum of `quantity * unit_price` over `lines`.
    pub total_amount: Money,

    /// Lines in insertion order.
    pub lines: Vec<OrderLine>,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the order was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// Recomputes the total from the current lines.
    pub fn computed_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }

    /// Returns true if the order belongs to the given customer.
    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == customer_id
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// A line of an order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewOrderLine {
    /// Returns the total price for this line.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A validated order ready to be persisted; the store assigns ids and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub lines: Vec<NewOrderLine>,
}
