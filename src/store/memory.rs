//! In-memory queue store

use crate::error::{PickupError, Result};
use crate::queue::PickupQueue;
use crate::store::QueueStore;
use crate::types::{GuildId, MessageId};
use crate::utils::queue_key;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

type StoreKey = (GuildId, String);

/// Queue store backed by a map, used by the console service and tests
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<StoreKey, PickupQueue>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored queues across guilds
    pub fn len(&self) -> usize {
        self.queues.read().map(|queues| queues.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error() -> PickupError {
        PickupError::StoreFailure {
            message: "Failed to acquire queue store lock".to_string(),
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn get(&self, guild_id: GuildId, name: &str) -> Result<Option<PickupQueue>> {
        let queues = self.queues.read().map_err(|_| Self::lock_error())?;
        Ok(queues.get(&(guild_id, queue_key(name))).cloned())
    }

    async fn put(&self, queue: &PickupQueue) -> Result<bool> {
        let mut queues = self.queues.write().map_err(|_| Self::lock_error())?;
        debug!(
            "Storing queue '{}' in guild {} ({} subscribers, {} waiting)",
            queue.name(),
            queue.guild_id(),
            queue.subscribers().len(),
            queue.wait_list().len()
        );
        queues.insert((queue.guild_id(), queue.key()), queue.clone());
        Ok(true)
    }

    async fn delete(&self, guild_id: GuildId, name: &str) -> Result<bool> {
        let mut queues = self.queues.write().map_err(|_| Self::lock_error())?;
        Ok(queues.remove(&(guild_id, queue_key(name))).is_some())
    }

    async fn list_by_guild(&self, guild_id: GuildId) -> Result<Vec<PickupQueue>> {
        let queues = self.queues.read().map_err(|_| Self::lock_error())?;
        Ok(queues
            .iter()
            .filter(|((guild, _), _)| *guild == guild_id)
            .map(|(_, queue)| queue.clone())
            .collect())
    }

    async fn find_by_rendered_message_id(
        &self,
        message_id: MessageId,
        guild_id: GuildId,
    ) -> Result<Option<PickupQueue>> {
        let queues = self.queues.read().map_err(|_| Self::lock_error())?;
        Ok(queues
            .values()
            .find(|queue| {
                queue.guild_id() == guild_id && queue.static_message_id() == Some(message_id)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subscriber;

    fn queue(guild_id: GuildId, name: &str) -> PickupQueue {
        PickupQueue::new(guild_id, name, &Subscriber::new(1, "owner"), 4)
    }

    #[tokio::test]
    async fn test_put_get_is_case_insensitive() {
        let store = InMemoryQueueStore::new();
        assert!(store.put(&queue(1, "CTF")).await.unwrap());

        let found = store.get(1, "ctf").await.unwrap().unwrap();
        assert_eq!(found.name(), "CTF");
        assert!(store.get(2, "ctf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = InMemoryQueueStore::new();
        store.put(&queue(1, "ctf")).await.unwrap();
        store.put(&queue(1, "tdm")).await.unwrap();
        store.put(&queue(2, "duel")).await.unwrap();

        assert_eq!(store.list_by_guild(1).await.unwrap().len(), 2);
        assert!(store.delete(1, "CTF").await.unwrap());
        assert!(!store.delete(1, "ctf").await.unwrap());
        assert_eq!(store.list_by_guild(1).await.unwrap().len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_rendered_message_id() {
        let store = InMemoryQueueStore::new();
        store
            .put(&queue(1, "ctf").with_message_id(Some(42)))
            .await
            .unwrap();

        assert_eq!(
            store
                .find_by_rendered_message_id(42, 1)
                .await
                .unwrap()
                .unwrap()
                .name(),
            "ctf"
        );
        assert!(store
            .find_by_rendered_message_id(42, 2)
            .await
            .unwrap()
            .is_none());
    }
}
