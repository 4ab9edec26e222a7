//! In-memory storage backends
//!
//! Used by tests and by `STORAGE_BACKEND=memory`. Nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{ChannelId, Message, Rocket, SortKey, SortOrder};

use super::{MessageLog, Result, RocketStore};

/// Message log keyed by channel, each channel kept sorted by sequence number.
pub struct InMemoryMessageLog {
    channels: RwLock<HashMap<ChannelId, Vec<Message>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of logged rows across all channels.
    pub async fn len(&self) -> usize {
        self.channels.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryMessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, message: &Message) -> Result<()> {
        let mut channels = self.channels.write().await;
        let entries = channels.entry(message.channel()).or_default();
        // Insert after any existing rows with the same number.
        let number = message.message_number();
        let at = entries.partition_point(|m| m.message_number() <= number);
        entries.insert(at, message.clone());
        Ok(())
    }

    async fn range_after(&self, channel: &ChannelId, after: u64) -> Result<Vec<Message>> {
        let channels = self.channels.read().await;
        Ok(channels
            .get(channel)
            .map(|entries| {
                let start = entries.partition_point(|m| m.message_number() <= after);
                entries[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn all(&self, channel: &ChannelId) -> Result<Vec<Message>> {
        let channels = self.channels.read().await;
        Ok(channels.get(channel).cloned().unwrap_or_default())
    }
}

/// Projection store keyed by channel.
pub struct InMemoryRocketStore {
    rockets: RwLock<HashMap<ChannelId, Rocket>>,
}

impl InMemoryRocketStore {
    pub fn new() -> Self {
        Self {
            rockets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRocketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RocketStore for InMemoryRocketStore {
    async fn get(&self, channel: &ChannelId) -> Result<Option<Rocket>> {
        Ok(self.rockets.read().await.get(channel).cloned())
    }

    async fn list(&self, sort_by: Option<SortKey>, order: SortOrder) -> Result<Vec<Rocket>> {
        let mut rockets: Vec<Rocket> = self.rockets.read().await.values().cloned().collect();

        if let Some(key) = sort_by {
            rockets.sort_by(|a, b| a.compare_by(b, key, order));
        }

        Ok(rockets)
    }

    async fn upsert(&self, rocket: &Rocket) -> Result<()> {
        self.rockets
            .write()
            .await
            .insert(rocket.channel, rocket.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rockets.read().await.len() as u64)
    }
}
