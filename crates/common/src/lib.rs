//! Shared types for the order lifecycle core.
//!
//! Identifiers, exact money, the order aggregate and pagination primitives
//! used by the store, cache, domain and projection crates.

pub mod money;
pub mod order;
pub mod page;
pub mod types;

pub use money::{Money, ParseMoneyError};
pub use order::{NewOrder, NewOrderLine, OrderAggregate, OrderLine, OrderStatus, UnknownStatus};
pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};
pub use types::{CustomerId, EventId, HistoryId, LineId, OrderId, ProductId};
