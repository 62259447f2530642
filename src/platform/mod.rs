//! Chat platform seams
//!
//! The pickup engine never talks to a chat service directly. Everything it
//! needs from one (messages, voice channels, roles, moderation flags) goes
//! through the traits in this module.

pub mod actor;
pub mod recording;

pub use actor::{Actor, BotSelf, GuildMember, PlatformUser};
pub use recording::{PlatformCall, RecordingChatPlatform};

use crate::error::Result;
use crate::queue::PickupQueue;
use crate::types::{ChannelId, GuildId, MessageId, PickupEvent, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Operations the engine consumes from the chat platform
///
/// Every call is fallible and may block on network I/O.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post a notice to the guild's pickup channel
    async fn publish_event(&self, guild_id: GuildId, event: PickupEvent) -> Result<()>;

    /// Send a notice privately to one user
    async fn direct_message(&self, user_id: UserId, event: PickupEvent) -> Result<()>;

    /// Create or refresh the live summary of a queue, returning its message id
    async fn render_queue(&self, queue: &PickupQueue) -> Result<MessageId>;

    /// Remove a queue's live summary
    async fn remove_queue_message(&self, guild_id: GuildId, message_id: MessageId) -> Result<()>;

    /// Look up an existing voice channel by name
    async fn find_voice_channel(&self, guild_id: GuildId, name: &str) -> Result<Option<ChannelId>>;

    /// Create a voice channel under a category; the new id is returned by this call
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        category: &str,
        name: &str,
    ) -> Result<ChannelId>;

    /// Delete a voice channel
    async fn delete_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;

    /// Members of a role
    async fn role_members(&self, guild_id: GuildId, role: &str) -> Result<Vec<UserId>>;

    /// Add the user to the role, or remove them if already a member; returns the new membership
    async fn toggle_role(&self, guild_id: GuildId, user_id: UserId, role: &str) -> Result<bool>;
}

/// Moderation lookup consulted before a user may join a queue
#[async_trait]
pub trait ModerationCheck: Send + Sync {
    /// The reason a user is flagged, if they are
    async fn is_flagged(&self, user_id: UserId, guild_id: GuildId) -> Result<Option<String>>;
}

/// Moderation flags kept in memory
#[derive(Debug, Default)]
pub struct InMemoryModeration {
    flags: RwLock<HashMap<(GuildId, UserId), String>>,
}

impl InMemoryModeration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a user in a guild
    pub fn flag(&self, guild_id: GuildId, user_id: UserId, reason: impl Into<String>) {
        if let Ok(mut flags) = self.flags.write() {
            flags.insert((guild_id, user_id), reason.into());
        }
    }

    /// Lift a flag; returns whether one existed
    pub fn unflag(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.flags
            .write()
            .map(|mut flags| flags.remove(&(guild_id, user_id)).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ModerationCheck for InMemoryModeration {
    async fn is_flagged(&self, user_id: UserId, guild_id: GuildId) -> Result<Option<String>> {
        let flags = self
            .flags
            .read()
            .map_err(|_| crate::error::PickupError::InternalError {
                message: "Failed to acquire moderation lock".to_string(),
            })?;
        Ok(flags.get(&(guild_id, user_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_moderation() {
        let moderation = InMemoryModeration::new();
        assert!(moderation.is_flagged(5, 1).await.unwrap().is_none());

        moderation.flag(1, 5, "afk abuse");
        assert_eq!(
            moderation.is_flagged(5, 1).await.unwrap().as_deref(),
            Some("afk abuse")
        );
        assert!(moderation.is_flagged(5, 2).await.unwrap().is_none());

        assert!(moderation.unflag(1, 5));
        assert!(!moderation.unflag(1, 5));
    }
}
