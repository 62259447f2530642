//! Chat platform that records instead of sending
//!
//! Used by the console service and by tests. Every outbound call is logged
//! and kept in a history; voice channels, rendered messages and roles are
//! tracked so later calls see a consistent view.

use crate::error::{PickupError, Result};
use crate::platform::ChatPlatform;
use crate::queue::PickupQueue;
use crate::types::{ChannelId, GuildId, MessageId, PickupEvent, UserId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::info;

/// One recorded outbound call
#[derive(Debug, Clone)]
pub enum PlatformCall {
    PublishEvent {
        guild_id: GuildId,
        event: PickupEvent,
    },
    DirectMessage {
        user_id: UserId,
        event: PickupEvent,
    },
    RenderQueue {
        guild_id: GuildId,
        queue_name: String,
        message_id: MessageId,
        summary: String,
    },
    RemoveQueueMessage {
        guild_id: GuildId,
        message_id: MessageId,
    },
    CreateVoiceChannel {
        guild_id: GuildId,
        category: String,
        name: String,
        channel_id: ChannelId,
    },
    DeleteVoiceChannel {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    ToggleRole {
        guild_id: GuildId,
        user_id: UserId,
        role: String,
        member: bool,
    },
}

#[derive(Debug)]
struct RecordingState {
    next_id: u64,
    calls: Vec<PlatformCall>,
    voice_channels: HashMap<GuildId, Vec<(ChannelId, String)>>,
    messages: HashMap<MessageId, (GuildId, String)>,
    roles: HashMap<(GuildId, String), BTreeSet<UserId>>,
    failing: bool,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self {
            next_id: 1000,
            calls: Vec::new(),
            voice_channels: HashMap::new(),
            messages: HashMap::new(),
            roles: HashMap::new(),
            failing: false,
        }
    }
}

impl RecordingState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process chat platform with a call history
#[derive(Debug, Default)]
pub struct RecordingChatPlatform {
    state: Mutex<RecordingState>,
}

impl RecordingChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make message and notice calls fail until switched back
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = failing;
        }
    }

    /// Put a user into a role
    pub fn add_role_member(&self, guild_id: GuildId, role: &str, user_id: UserId) {
        if let Ok(mut state) = self.state.lock() {
            state
                .roles
                .entry((guild_id, role.to_string()))
                .or_default()
                .insert(user_id);
        }
    }

    /// Every call so far, oldest first
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Notices published to a guild channel
    pub fn published(&self, guild_id: GuildId) -> Vec<PickupEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::PublishEvent { guild_id: g, event } if g == guild_id => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Notices sent privately to a user
    pub fn direct_messages(&self, user_id: UserId) -> Vec<PickupEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::DirectMessage { user_id: u, event } if u == user_id => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Voice channels that currently exist in a guild
    pub fn voice_channels(&self, guild_id: GuildId) -> Vec<(ChannelId, String)> {
        self.state
            .lock()
            .map(|state| {
                state
                    .voice_channels
                    .get(&guild_id)
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Latest summary text of a rendered queue message
    pub fn rendered(&self, message_id: MessageId) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.messages.get(&message_id).map(|(_, text)| text.clone()))
    }

    pub fn clear_history(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RecordingState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().map_err(|_| PickupError::InternalError {
            message: "Failed to acquire recording platform lock".to_string(),
        })?;
        f(&mut state)
    }

    fn check_failing(state: &RecordingState, operation: &str) -> Result<()> {
        if state.failing {
            return Err(PickupError::PlatformFailure {
                message: format!("{} rejected by platform", operation),
            }
            .into());
        }
        Ok(())
    }
}

/// One-line summary of a queue
pub fn queue_summary(queue: &PickupQueue) -> String {
    let names: Vec<&str> = queue.subscribers().iter().map(|s| s.name.as_str()).collect();
    let mut summary = format!(
        "{} [{}/{}] {}%: {}",
        queue.name(),
        queue.subscribers().len(),
        queue.max_in_queue(),
        queue.readiness(),
        if names.is_empty() {
            "-".to_string()
        } else {
            names.join(", ")
        }
    );
    if !queue.wait_list().is_empty() {
        let waiting: Vec<&str> = queue.wait_list().iter().map(|s| s.name.as_str()).collect();
        summary.push_str(&format!(" | waiting: {}", waiting.join(", ")));
    }
    if queue.is_started() {
        summary.push_str(" | started");
    }
    summary
}

#[async_trait]
impl ChatPlatform for RecordingChatPlatform {
    async fn publish_event(&self, guild_id: GuildId, event: PickupEvent) -> Result<()> {
        self.with_state(|state| {
            Self::check_failing(state, "publish")?;
            info!("[guild {}] {} {}", guild_id, event.kind(), describe(&event));
            state.calls.push(PlatformCall::PublishEvent { guild_id, event });
            Ok(())
        })
    }

    async fn direct_message(&self, user_id: UserId, event: PickupEvent) -> Result<()> {
        self.with_state(|state| {
            Self::check_failing(state, "direct message")?;
            info!("[dm {}] {} {}", user_id, event.kind(), describe(&event));
            state.calls.push(PlatformCall::DirectMessage { user_id, event });
            Ok(())
        })
    }

    async fn render_queue(&self, queue: &PickupQueue) -> Result<MessageId> {
        let summary = queue_summary(queue);
        self.with_state(|state| {
            Self::check_failing(state, "render")?;
            let message_id = match queue.static_message_id() {
                Some(id) if state.messages.contains_key(&id) => id,
                _ => state.allocate_id(),
            };
            info!("[guild {}] queue message {}: {}", queue.guild_id(), message_id, summary);
            state
                .messages
                .insert(message_id, (queue.guild_id(), summary.clone()));
            state.calls.push(PlatformCall::RenderQueue {
                guild_id: queue.guild_id(),
                queue_name: queue.name().to_string(),
                message_id,
                summary,
            });
            Ok(message_id)
        })
    }

    async fn remove_queue_message(&self, guild_id: GuildId, message_id: MessageId) -> Result<()> {
        self.with_state(|state| {
            state.messages.remove(&message_id);
            state
                .calls
                .push(PlatformCall::RemoveQueueMessage { guild_id, message_id });
            Ok(())
        })
    }

    async fn find_voice_channel(&self, guild_id: GuildId, name: &str) -> Result<Option<ChannelId>> {
        self.with_state(|state| {
            Ok(state
                .voice_channels
                .get(&guild_id)
                .and_then(|channels| channels.iter().find(|(_, n)| n == name))
                .map(|(id, _)| *id))
        })
    }

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        category: &str,
        name: &str,
    ) -> Result<ChannelId> {
        self.with_state(|state| {
            let channel_id = state.allocate_id();
            state
                .voice_channels
                .entry(guild_id)
                .or_default()
                .push((channel_id, name.to_string()));
            info!(
                "[guild {}] created voice channel '{}' ({}) in '{}'",
                guild_id, name, channel_id, category
            );
            state.calls.push(PlatformCall::CreateVoiceChannel {
                guild_id,
                category: category.to_string(),
                name: name.to_string(),
                channel_id,
            });
            Ok(channel_id)
        })
    }

    async fn delete_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.with_state(|state| {
            if let Some(channels) = state.voice_channels.get_mut(&guild_id) {
                channels.retain(|(id, _)| *id != channel_id);
            }
            info!("[guild {}] deleted voice channel {}", guild_id, channel_id);
            state
                .calls
                .push(PlatformCall::DeleteVoiceChannel { guild_id, channel_id });
            Ok(())
        })
    }

    async fn role_members(&self, guild_id: GuildId, role: &str) -> Result<Vec<UserId>> {
        self.with_state(|state| {
            Ok(state
                .roles
                .get(&(guild_id, role.to_string()))
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default())
        })
    }

    async fn toggle_role(&self, guild_id: GuildId, user_id: UserId, role: &str) -> Result<bool> {
        self.with_state(|state| {
            let members = state.roles.entry((guild_id, role.to_string())).or_default();
            let member = if members.remove(&user_id) {
                false
            } else {
                members.insert(user_id);
                true
            };
            state.calls.push(PlatformCall::ToggleRole {
                guild_id,
                user_id,
                role: role.to_string(),
                member,
            });
            Ok(member)
        })
    }
}

fn describe(event: &PickupEvent) -> String {
    match event {
        PickupEvent::QueueCreated { queue_name, owner } => {
            format!("'{}' by {}", queue_name, owner.name)
        }
        PickupEvent::PlayerJoined {
            queue_name,
            subscriber,
            readiness,
        } => format!("{} -> '{}' ({}%)", subscriber.name, queue_name, readiness),
        PickupEvent::PlayerWaitListed {
            queue_name,
            subscriber,
            position,
        } => format!("{} waiting for '{}' (#{})", subscriber.name, queue_name, position),
        PickupEvent::PlayerLeft {
            queue_name,
            subscriber,
            promoted,
        } => match promoted {
            Some(p) => format!("{} left '{}', {} moves up", subscriber.name, queue_name, p.name),
            None => format!("{} left '{}'", subscriber.name, queue_name),
        },
        PickupEvent::WaitListPromoted {
            queue_name,
            subscriber,
        } => format!("{} now in '{}'", subscriber.name, queue_name),
        PickupEvent::QueueFull {
            queue_name,
            subscribers,
        } => format!("'{}' is full with {} players", queue_name, subscribers.len()),
        PickupEvent::QueueRemoved { queue_name }
        | PickupEvent::QueueUpdated { queue_name }
        | PickupEvent::QueueStopped { queue_name } => format!("'{}'", queue_name),
        PickupEvent::QueueRenamed { old_name, new_name } => {
            format!("'{}' -> '{}'", old_name, new_name)
        }
        PickupEvent::UserCleared { subscriber, queues } => {
            format!("{} removed from {}", subscriber.name, queues.join(", "))
        }
        PickupEvent::TeamsReady { queue_name, teams } => format!(
            "'{}': {}",
            queue_name,
            teams
                .iter()
                .map(|t| {
                    let names: Vec<&str> = t.subscribers.iter().map(|s| s.name.as_str()).collect();
                    format!("{} [{}]", t.name, names.join(", "))
                })
                .collect::<Vec<_>>()
                .join(" vs ")
        ),
        PickupEvent::QueuePromoted {
            queue_name,
            missing_players,
        } => format!("'{}' needs {} more", queue_name, missing_players),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subscriber;

    #[tokio::test]
    async fn test_render_reuses_message_id() {
        let platform = RecordingChatPlatform::new();
        let queue = PickupQueue::new(1, "ctf", &Subscriber::new(1, "a"), 2);

        let first = platform.render_queue(&queue).await.unwrap();
        let second = platform
            .render_queue(&queue.with_message_id(Some(first)))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(platform.rendered(first).unwrap(), "ctf [0/4] 0%: -");

        platform.remove_queue_message(1, first).await.unwrap();
        assert!(platform.rendered(first).is_none());
    }

    #[tokio::test]
    async fn test_toggle_role() {
        let platform = RecordingChatPlatform::new();
        assert!(platform.toggle_role(1, 5, "promo").await.unwrap());
        assert_eq!(platform.role_members(1, "promo").await.unwrap(), vec![5]);
        assert!(!platform.toggle_role(1, 5, "promo").await.unwrap());
        assert!(platform.role_members(1, "promo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let platform = RecordingChatPlatform::new();
        platform.set_failing(true);
        let event = PickupEvent::QueueRemoved {
            queue_name: "ctf".to_string(),
        };
        assert!(platform.publish_event(1, event.clone()).await.is_err());

        platform.set_failing(false);
        platform.publish_event(1, event).await.unwrap();
        assert_eq!(platform.published(1).len(), 1);
    }

    #[tokio::test]
    async fn test_voice_channel_lifecycle() {
        let platform = RecordingChatPlatform::new();
        let id = platform.create_voice_channel(1, "Pickup", "ctf 🔴").await.unwrap();
        assert_eq!(platform.find_voice_channel(1, "ctf 🔴").await.unwrap(), Some(id));
        assert_eq!(platform.find_voice_channel(2, "ctf 🔴").await.unwrap(), None);

        platform.delete_voice_channel(1, id).await.unwrap();
        assert!(platform.voice_channels(1).is_empty());
    }
}
