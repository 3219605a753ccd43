//! The fixed set of event handlers.

use cache::CacheAdapter;
use domain::OrderEvent;
use order_store::HistoryStore;

use crate::Result;
use crate::cache_projection::CacheProjection;
use crate::history_projection::HistoryProjection;

/// A subscriber of order events.
///
/// The handler set is closed, so this is an enum rather than a trait object.
pub enum ProjectionHandler<C, H> {
    Cache(CacheProjection<C>),
    History(HistoryProjection<H>),
}

impl<C, H> ProjectionHandler<C, H>
where
    C: CacheAdapter,
    H: HistoryStore,
{
    /// Returns the name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionHandler::Cache(_) => "cache",
            ProjectionHandler::History(_) => "history",
        }
    }

    /// Handles a single event.
    pub async fn handle(&self, event: &OrderEvent) -> Result<()> {
        match self {
            ProjectionHandler::Cache(projection) => projection.handle(event).await,
            ProjectionHandler::History(projection) => projection.handle(event).await,
        }
    }
}

impl<C, H> From<CacheProjection<C>> for ProjectionHandler<C, H> {
    fn from(projection: CacheProjection<C>) -> Self {
        ProjectionHandler::Cache(projection)
    }
}

impl<C, H> From<HistoryProjection<H>> for ProjectionHandler<C, H> {
    fn from(projection: HistoryProjection<H>) -> Self {
        ProjectionHandler::History(projection)
    }
}
