//! Order aggregate rules, lifecycle events and the mutation service.

mod events;
mod service;
mod validation;

pub use events::{
    EventKind, FieldChange, FieldChanges, OrderCreatedData, OrderDeletedData, OrderEvent,
    OrderEventData, OrderUpdatedData, diff_orders,
};
pub use service::OrderService;
pub use validation::{
    CreateOrderInput, LineInput, MAX_LINES, MAX_QUANTITY, MAX_UNIT_PRICE, MIN_QUANTITY,
    OrderPatch, validate_for_create, validate_for_update,
};
