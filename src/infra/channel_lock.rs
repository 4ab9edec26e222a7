//! Per-channel mutual exclusion for reconciliation
//!
//! Every reconcile cycle for a channel runs while holding that channel's
//! [`ChannelGuard`], so two concurrent ingests can never interleave a read of
//! the cursor with a write of the projection. Different channels proceed
//! independently.
//!
//! # Implementations
//!
//! - [`LocalChannelLocks`]: one lazily-created mutex per channel, pruned once
//!   the map grows past a threshold
//! - [`StripedChannelLocks`]: a fixed pool of mutexes selected by hash
//! - [`PgAdvisoryChannelLocks`](super::postgres::PgAdvisoryChannelLocks):
//!   Postgres advisory locks, for several processes sharing one database

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::ChannelId;

use super::Result;

/// Default number of stripes for [`StripedChannelLocks`].
pub const DEFAULT_LOCK_STRIPES: usize = 1024;

/// Default map size above which [`LocalChannelLocks`] prunes idle entries.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 10_000;

/// Exclusive hold on one channel. Dropping it releases the channel.
pub struct ChannelGuard {
    _held: Box<dyn Send>,
}

impl ChannelGuard {
    /// Wrap whatever value keeps the lock held.
    pub fn new<T: Send + 'static>(held: T) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for ChannelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelGuard").finish_non_exhaustive()
    }
}

/// Serializes reconciliation per channel.
#[async_trait]
pub trait ChannelSerializer: Send + Sync {
    /// Wait until the channel is free and take it.
    async fn acquire(&self, channel: &ChannelId) -> Result<ChannelGuard>;

    /// Short name for logs and configuration.
    fn name(&self) -> &'static str;
}

/// Process-local lock per channel.
///
/// The map mutex is held only for lookup and insert, never across the
/// reconcile body.
pub struct LocalChannelLocks {
    locks: Mutex<HashMap<ChannelId, Arc<AsyncMutex<()>>>>,
    prune_threshold: usize,
}

impl LocalChannelLocks {
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            prune_threshold: prune_threshold.max(1),
        }
    }

    /// Number of channel locks currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, channel: &ChannelId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(channel) {
            return lock.clone();
        }

        if locks.len() >= self.prune_threshold {
            // Only the map itself references an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        locks
            .entry(*channel)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for LocalChannelLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSerializer for LocalChannelLocks {
    async fn acquire(&self, channel: &ChannelId) -> Result<ChannelGuard> {
        let lock = self.lock_for(channel);
        Ok(ChannelGuard::new(lock.lock_owned().await))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Fixed pool of locks selected by hashing the channel.
///
/// Memory stays bounded; unrelated channels sharing a stripe wait on each other.
pub struct StripedChannelLocks {
    stripes: Vec<Arc<AsyncMutex<()>>>,
}

impl StripedChannelLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1))
            .map(|_| Arc::new(AsyncMutex::new(())))
            .collect();
        Self { stripes }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_index(&self, channel: &ChannelId) -> usize {
        let mut hasher = DefaultHasher::new();
        channel.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for StripedChannelLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_STRIPES)
    }
}

#[async_trait]
impl ChannelSerializer for StripedChannelLocks {
    async fn acquire(&self, channel: &ChannelId) -> Result<ChannelGuard> {
        let stripe = self.stripes[self.stripe_index(channel)].clone();
        Ok(ChannelGuard::new(stripe.lock_owned().await))
    }

    fn name(&self) -> &'static str {
        "striped"
    }
}
