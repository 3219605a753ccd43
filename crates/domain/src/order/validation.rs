//! Invariant checks for order creation and updates.
//!
//! Validators collect every violation instead of stopping at the first one,
//! and always compute `total_amount` from the lines.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, NewOrder, NewOrderLine, OrderAggregate, OrderStatus, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{FieldViolation, ValidationError};

/// Maximum number of lines in one order.
pub const MAX_LINES: usize = 50;

/// Inclusive quantity bounds of a line.
pub const MIN_QUANTITY: i64 = 1;
pub const MAX_QUANTITY: i64 = 1000;

/// Largest accepted unit price (999999.99).
pub const MAX_UNIT_PRICE: Money = Money::from_cents(99_999_999);

/// Caller input for a new order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl LineInput {
    pub fn new(product_id: i64, quantity: i64, unit_price: Money) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            quantity,
            unit_price,
        }
    }
}

/// Caller input for a new order. The owner comes from the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub order_date: DateTime<Utc>,
    /// Defaults to `PENDING`.
    pub status: Option<String>,
    pub lines: Vec<LineInput>,
}

/// Changes requested for an existing order. Only the status can change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<String>,
}

impl OrderPatch {
    /// A patch that sets the status.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
    }
}

#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, message));
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError { violations: self.0 })
        }
    }
}

fn parse_status(raw: &str, violations: &mut Violations) -> Option<OrderStatus> {
    match raw.parse::<OrderStatus>() {
        Ok(status) => Some(status),
        Err(_) => {
            violations.push("status", "must be one of PENDING, SHIPPED, CANCELLED");
            None
        }
    }
}

/// Validates a creation request and builds the order to persist.
///
/// `now` is the reference instant for the order-date check.
pub fn validate_for_create(
    customer_id: CustomerId,
    input: &CreateOrderInput,
    now: DateTime<Utc>,
) -> Result<NewOrder, ValidationError> {
    let mut violations = Violations::default();

    if !customer_id.is_positive() {
        violations.push("customer_id", "must be positive");
    }

    if input.order_date > now {
        violations.push("order_date", "cannot be in the future");
    }

    let status = match &input.status {
        Some(raw) => parse_status(raw, &mut violations).unwrap_or_default(),
        None => OrderStatus::Pending,
    };

    if input.lines.is_empty() {
        violations.push("lines", "must contain at least one line");
    } else if input.lines.len() > MAX_LINES {
        violations.push("lines", format!("must contain at most {MAX_LINES} lines"));
    }

    let mut lines = Vec::with_capacity(input.lines.len());
    for (i, line) in input.lines.iter().enumerate() {
        if !line.product_id.is_positive() {
            violations.push(format!("lines[{i}].product_id"), "must be positive");
        }

        let quantity = u32::try_from(line.quantity)
            .ok()
            .filter(|q| (MIN_QUANTITY..=MAX_QUANTITY).contains(&i64::from(*q)));
        if quantity.is_none() {
            violations.push(
                format!("lines[{i}].quantity"),
                format!("must be between {MIN_QUANTITY} and {MAX_QUANTITY}"),
            );
        }

        if line.unit_price.is_negative() || line.unit_price > MAX_UNIT_PRICE {
            violations.push(
                format!("lines[{i}].unit_price"),
                format!("must be between 0.00 and {MAX_UNIT_PRICE}"),
            );
        }

        if let Some(quantity) = quantity {
            lines.push(NewOrderLine {
                product_id: line.product_id,
                quantity,
                unit_price: line.unit_price,
            });
        }
    }

    let total_amount = lines.iter().map(NewOrderLine::line_total).sum();

    violations.finish(NewOrder {
        customer_id,
        order_date: input.order_date,
        status,
        total_amount,
        lines,
    })
}

/// Applies a patch to an existing order and re-checks the result.
///
/// Returns the candidate state; identity and timestamps are left for the
/// store to manage.
pub fn validate_for_update(
    existing: &OrderAggregate,
    patch: &OrderPatch,
) -> Result<OrderAggregate, ValidationError> {
    let mut violations = Violations::default();
    let mut candidate = existing.clone();

    match &patch.status {
        Some(raw) => {
            if let Some(status) = parse_status(raw, &mut violations) {
                candidate.status = status;
            }
        }
        None => violations.push("status", "is required"),
    }

    if candidate.lines.is_empty() || candidate.lines.len() > MAX_LINES {
        violations.push("lines", format!("must contain between 1 and {MAX_LINES} lines"));
    }

    candidate.total_amount = candidate.computed_total();

    violations.finish(candidate)
}
