//! Trait definitions for the resequencer's storage collaborators

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{ChannelId, Message, Rocket, SortKey, SortOrder};

use super::Result;

/// Append-only log of every message received, ordered per channel.
///
/// Invariant: nothing is ever rejected for its sequence number or for being a duplicate.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append a message to the log
    async fn append(&self, message: &Message) -> Result<()>;

    /// Messages for a channel with sequence number strictly greater than `after`
    ///
    /// Ascending by sequence number; duplicates keep insertion order.
    async fn range_after(&self, channel: &ChannelId, after: u64) -> Result<Vec<Message>>;

    /// Every logged message for a channel, ascending by sequence number
    async fn all(&self, channel: &ChannelId) -> Result<Vec<Message>>;
}

/// Keyed storage of the current projection per channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RocketStore: Send + Sync {
    /// Look up the projection for a channel
    async fn get(&self, channel: &ChannelId) -> Result<Option<Rocket>>;

    /// All projections, sorted by `sort_by` when given
    ///
    /// Without a sort key the order is whatever the store returns.
    async fn list(&self, sort_by: Option<SortKey>, order: SortOrder) -> Result<Vec<Rocket>>;

    /// Insert or replace the projection keyed by its channel
    async fn upsert(&self, rocket: &Rocket) -> Result<()>;

    /// Number of stored projections
    async fn count(&self) -> Result<u64>;
}
