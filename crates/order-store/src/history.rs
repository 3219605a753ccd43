//! Append-only audit log of order mutations.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, EventId, HistoryId, OrderId, Result, StoreError};

/// The kind of mutation a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
}

impl HistoryAction {
    /// Returns the action name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "CREATED",
            HistoryAction::Updated => "UPDATED",
            HistoryAction::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(HistoryAction::Created),
            "UPDATED" => Ok(HistoryAction::Updated),
            "DELETED" => Ok(HistoryAction::Deleted),
            other => Err(StoreError::Corrupt(format!(
                "unknown history action {other:?}"
            ))),
        }
    }
}

/// A history entry that has not been written yet.
///
/// `event_id` identifies the domain event the entry was derived from; appending
/// the same event twice leaves a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub action: HistoryAction,
    pub changes: serde_json::Value,
    pub performed_by: CustomerId,
}

/// An immutable audit record of one committed order mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub event_id: EventId,
    pub order_id: OrderId,
    pub action: HistoryAction,
    pub changes: serde_json::Value,
    pub performed_by: CustomerId,
    pub created_at: DateTime<Utc>,
}

/// Append-only storage for history records.
///
/// Records are never updated or deleted once written.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a record. Returns the stored record, or the existing one if the
    /// event was already recorded.
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord>;

    /// Returns all records for an order in append order.
    async fn history_for(&self, order_id: OrderId) -> Result<Vec<HistoryRecord>>;
}
