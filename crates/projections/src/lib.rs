//! Event fan-out for the order lifecycle core.
//!
//! This crate provides:
//! - [`EventBus`], delivering committed [`domain::OrderEvent`]s to handlers
//! - [`Subscriptions`], the start-up routing table from event kind to handlers
//! - [`CacheProjection`] and [`HistoryProjection`], the two handlers

pub mod bus;
pub mod cache_projection;
pub mod error;
pub mod handler;
pub mod history_projection;
pub mod subscriptions;

pub use bus::{BUS_LOCKS_GAUGE, EventBus, HandlerOutcome, PublishReport};
pub use cache_projection::CacheProjection;
pub use error::{ProjectionError, Result};
pub use handler::ProjectionHandler;
pub use history_projection::HistoryProjection;
pub use subscriptions::{Subscriptions, SubscriptionsBuilder};
