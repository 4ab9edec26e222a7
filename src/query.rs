//! Read-only access to rocket projections.

use std::sync::Arc;

use crate::domain::{ChannelId, Rocket, SortKey, SortOrder};
use crate::infra::{ResequencerError, Result, RocketStore};

/// Query façade over the projection store
#[derive(Clone)]
pub struct RocketQueryService {
    store: Arc<dyn RocketStore>,
}

impl RocketQueryService {
    pub fn new(store: Arc<dyn RocketStore>) -> Self {
        Self { store }
    }

    /// All projections, sorted by `sort_by` when given, ascending unless `order` is `Desc`
    pub async fn list(&self, sort_by: Option<SortKey>, order: SortOrder) -> Result<Vec<Rocket>> {
        self.store.list(sort_by, order).await
    }

    /// The projection for one channel, or `NotFound`
    pub async fn get(&self, channel: &ChannelId) -> Result<Rocket> {
        self.store
            .get(channel)
            .await?
            .ok_or(ResequencerError::NotFound(*channel))
    }

    /// Number of stored projections
    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}
