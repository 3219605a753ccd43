//! Append-only audit trail of committed mutations.

use domain::OrderEvent;
use order_store::{HistoryStore, NewHistoryRecord};

use crate::Result;

/// Appends one history record per event.
///
/// The record is keyed by the event id, so delivering the same event twice
/// leaves a single record. Failed appends are not retried.
pub struct HistoryProjection<H> {
    history: H,
}

impl<H: HistoryStore> HistoryProjection<H> {
    pub fn new(history: H) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub async fn handle(&self, event: &OrderEvent) -> Result<()> {
        let record = NewHistoryRecord {
            event_id: event.event_id,
            order_id: event.order_id,
            action: event.action(),
            changes: event.changes()?,
            performed_by: event.actor_id,
        };

        let stored = self.history.append(record).await?;
        tracing::debug!(history_id = %stored.id, action = %stored.action, "history appended");
        Ok(())
    }
}
