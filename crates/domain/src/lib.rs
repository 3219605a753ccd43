//! Domain layer of the order lifecycle core.
//!
//! This crate provides:
//! - validation of order creation and update requests
//! - the `OrderEvent` lifecycle events and the `EventPublisher` seam
//! - a per-key lock table serializing mutations
//! - `OrderService`, the create/get/update/delete/list operations

pub mod error;
pub mod guard;
pub mod order;
pub mod publisher;

pub use error::{DomainError, FieldViolation, Result, ValidationError};
pub use guard::{GuardKey, KeyedGuard, KeyedLock, ORDER_LOCKS_GAUGE};
pub use order::{
    CreateOrderInput, EventKind, FieldChange, FieldChanges, LineInput, OrderCreatedData,
    OrderDeletedData, OrderEvent, OrderEventData, OrderPatch, OrderService, OrderUpdatedData,
    diff_orders, validate_for_create, validate_for_update,
};
pub use publisher::{EventPublisher, RecordingPublisher};
