//! Durable order storage for the order lifecycle core.
//!
//! - [`OrderStore`]: transactional create/read/update/delete of an order
//!   header together with its lines
//! - [`HistoryStore`]: append-only audit log of committed mutations
//! - in-memory implementations for tests and a PostgreSQL implementation

pub mod error;
pub mod history;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{
    CustomerId, EventId, HistoryId, LineId, Money, NewOrder, NewOrderLine, OrderAggregate,
    OrderId, OrderLine, OrderStatus, PageRequest, ProductId,
};
pub use error::{Result, StoreError};
pub use history::{HistoryAction, HistoryRecord, HistoryStore, NewHistoryRecord};
pub use memory::{InMemoryHistoryStore, InMemoryOrderStore};
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
