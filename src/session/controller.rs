//! Session controller: starts and stops games for a queue

use crate::error::Result;
use crate::platform::ChatPlatform;
use crate::queue::PickupQueue;
use crate::scheduler::{AnnouncementScheduler, ScheduledAnnouncement};
use crate::session::teams::{form_teams, voice_channel_name};
use crate::types::{RosterSnapshot, Team, VoiceChannel};
use crate::utils::current_timestamp;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a ready queue into teams and back
///
/// The controller only computes the next queue value and talks to the chat
/// platform about voice channels. Persisting the result and notifying users
/// is left to the caller.
pub struct SessionController {
    platform: Arc<dyn ChatPlatform>,
    scheduler: Option<Arc<AnnouncementScheduler>>,
    voice_category: String,
}

impl SessionController {
    pub fn new(platform: Arc<dyn ChatPlatform>, voice_category: impl Into<String>) -> Self {
        Self {
            platform,
            scheduler: None,
            voice_category: voice_category.into(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<AnnouncementScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Shuffle the subscribers into teams and bind their voice channels
    ///
    /// The returned queue is marked started.
    pub async fn start(&self, queue: &PickupQueue) -> Result<PickupQueue> {
        let mut teams = {
            let mut rng = rand::thread_rng();
            form_teams(
                queue.subscribers(),
                queue.is_coop(),
                queue.captain_mode(),
                &mut rng,
            )
        };

        if queue.voice_enabled() {
            for team in teams.iter_mut() {
                team.voice_channel = Some(self.bind_voice_channel(queue, team).await);
            }
        }

        info!(
            "Starting queue '{}' in guild {} with {} team(s): {}",
            queue.name(),
            queue.guild_id(),
            teams.len(),
            teams
                .iter()
                .map(|t| format!("{} ({})", t.name, t.subscribers.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(queue.with_teams(teams))
    }

    /// Arm the delayed announcements for a started queue
    ///
    /// Nothing is armed without a scheduler or a reachable server address.
    pub fn arm_announcements(&self, queue: &PickupQueue) -> Vec<ScheduledAnnouncement> {
        match (&self.scheduler, roster_snapshot(queue)) {
            (Some(scheduler), Some(snapshot)) => scheduler.schedule(snapshot),
            _ => Vec::new(),
        }
    }

    /// Release the teams' voice channels and return the queue to the open state
    pub async fn teardown(&self, queue: &PickupQueue) -> Result<PickupQueue> {
        for team in queue.teams() {
            let Some(channel_id) = team.voice_channel.as_ref().and_then(|v| v.channel_id) else {
                continue;
            };
            if let Err(e) = self
                .platform
                .delete_voice_channel(queue.guild_id(), channel_id)
                .await
            {
                warn!(
                    "Failed to delete voice channel {} of '{}': {}",
                    channel_id,
                    queue.name(),
                    e
                );
            }
        }

        debug!("Tore down teams of queue '{}'", queue.name());
        Ok(queue.stopped())
    }

    async fn bind_voice_channel(&self, queue: &PickupQueue, team: &Team) -> VoiceChannel {
        let name = voice_channel_name(queue.name(), team.side);
        let guild_id = queue.guild_id();

        let channel_id = match self.platform.find_voice_channel(guild_id, &name).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => match self
                .platform
                .create_voice_channel(guild_id, &self.voice_category, &name)
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Failed to create voice channel '{}': {}", name, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to look up voice channel '{}': {}", name, e);
                None
            }
        };

        VoiceChannel { name, channel_id }
    }
}

/// Immutable copy of a started queue's rosters for the announcement timers
pub fn roster_snapshot(queue: &PickupQueue) -> Option<RosterSnapshot> {
    if !queue.is_started() {
        return None;
    }
    let (host, port) = queue.server_address()?;
    Some(RosterSnapshot {
        guild_id: queue.guild_id(),
        queue_name: queue.name().to_string(),
        host: host.to_string(),
        port,
        teams: queue.teams().to_vec(),
        taken_at: current_timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformCall, RecordingChatPlatform};
    use crate::queue::parse_operators;
    use crate::types::{Subscriber, TeamSide};

    fn full_queue(team_size: usize, operators: &str) -> PickupQueue {
        let owner = Subscriber::new(1, "p1");
        let mut queue = PickupQueue::new(9, "CTF", &owner, team_size);
        if let Some(flags) = parse_operators(operators) {
            queue = queue.with_operators(&flags);
        }
        for id in 1..=(team_size as u64 * 2) {
            queue = queue.subscribe(Subscriber::new(id, format!("p{}", id))).0;
        }
        queue
    }

    #[tokio::test]
    async fn test_start_binds_voice_channels() {
        let platform = Arc::new(RecordingChatPlatform::new());
        let controller = SessionController::new(platform.clone(), "Pickup");

        let started = controller.start(&full_queue(2, "")).await.unwrap();
        assert!(started.is_started());
        assert_eq!(started.teams().len(), 2);

        let red = &started.teams()[0];
        assert_eq!(red.side, TeamSide::Red);
        let voice = red.voice_channel.as_ref().unwrap();
        assert_eq!(voice.name, "CTF 🔴");
        assert!(voice.channel_id.is_some());
        assert_eq!(platform.voice_channels(9).len(), 2);
    }

    #[tokio::test]
    async fn test_existing_voice_channel_is_reused() {
        let platform = Arc::new(RecordingChatPlatform::new());
        let existing = platform
            .create_voice_channel(9, "Pickup", "CTF 🔴")
            .await
            .unwrap();
        let controller = SessionController::new(platform.clone(), "Pickup");

        let started = controller.start(&full_queue(1, "")).await.unwrap();
        assert_eq!(
            started.teams()[0].voice_channel.as_ref().unwrap().channel_id,
            Some(existing)
        );
        assert_eq!(platform.voice_channels(9).len(), 2);
    }

    #[tokio::test]
    async fn test_novoice_skips_channels() {
        let platform = Arc::new(RecordingChatPlatform::new());
        let controller = SessionController::new(platform.clone(), "Pickup");

        let started = controller.start(&full_queue(2, "-novoice -coop")).await.unwrap();
        assert_eq!(started.teams().len(), 1);
        assert!(started.teams()[0].voice_channel.is_none());
        assert!(platform.voice_channels(9).is_empty());
    }

    #[tokio::test]
    async fn test_teardown_deletes_channels() {
        let platform = Arc::new(RecordingChatPlatform::new());
        let controller = SessionController::new(platform.clone(), "Pickup");

        let started = controller.start(&full_queue(2, "")).await.unwrap();
        let stopped = controller.teardown(&started).await.unwrap();

        assert!(!stopped.is_started());
        assert!(stopped.teams().is_empty());
        assert!(platform.voice_channels(9).is_empty());
        assert_eq!(
            platform
                .calls()
                .iter()
                .filter(|c| matches!(c, PlatformCall::DeleteVoiceChannel { .. }))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_snapshot_requires_rcon_address() {
        let platform = Arc::new(RecordingChatPlatform::new());
        let controller = SessionController::new(platform, "Pickup");

        let plain = controller.start(&full_queue(1, "-novoice")).await.unwrap();
        assert!(roster_snapshot(&plain).is_none());
        assert!(controller.arm_announcements(&plain).is_empty());

        let rcon = controller
            .start(&full_queue(1, "-novoice -rcon -host:ra3.se -port:27960"))
            .await
            .unwrap();
        let snapshot = roster_snapshot(&rcon).unwrap();
        assert_eq!(snapshot.host, "ra3.se");
        assert_eq!(snapshot.teams, rcon.teams().to_vec());
    }
}
