//! Queue persistence contract
//!
//! Queues are keyed by (guild, lowercased name). Implementations offer no
//! multi-key transactions; the last write wins.

pub mod memory;

pub use memory::InMemoryQueueStore;

use crate::error::Result;
use crate::queue::PickupQueue;
use crate::types::{GuildId, MessageId};
use async_trait::async_trait;

/// Trait for queue storage operations
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Fetch a queue by name, ignoring case
    async fn get(&self, guild_id: GuildId, name: &str) -> Result<Option<PickupQueue>>;

    /// Insert or replace a queue; returns whether the write was accepted
    async fn put(&self, queue: &PickupQueue) -> Result<bool>;

    /// Remove a queue; returns whether anything was removed
    async fn delete(&self, guild_id: GuildId, name: &str) -> Result<bool>;

    /// All queues of a guild, in no particular order
    async fn list_by_guild(&self, guild_id: GuildId) -> Result<Vec<PickupQueue>>;

    /// Find the queue whose rendered summary is the given message
    async fn find_by_rendered_message_id(
        &self,
        message_id: MessageId,
        guild_id: GuildId,
    ) -> Result<Option<PickupQueue>>;
}
