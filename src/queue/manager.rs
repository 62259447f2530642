//! Queue manager: the lifecycle engine behind every pickup command
//!
//! Each mutating operation takes the queue's lock, fetches the current value
//! from the store, computes the next value, persists it and only then renders
//! the queue summary and publishes notices. A failed write aborts the command
//! before anything is announced. Rendering and notices are best effort: their
//! failures are logged and do not undo the stored state.

use crate::config::PickupSettings;
use crate::error::{PickupError, Result};
use crate::metrics::MetricsCollector;
use crate::platform::{ChatPlatform, ModerationCheck};
use crate::queue::instance::{LeaveOutcome, Membership, PickupQueue, SubscribeOutcome};
use crate::queue::locks::QueueLocks;
use crate::queue::operators::{parse_operators, OperatorFlags};
use crate::queue::selection::{order_by_readiness, select_default_queue};
use crate::rcon::{ClientInfo, GameServerLink, ServerStatus};
use crate::session::SessionController;
use crate::store::QueueStore;
use crate::types::{
    GuildId, MessageId, PickupEvent, ReactionKind, Requester, Subscriber, Team, UserId,
};
use crate::utils::{clamp_team_size, queue_key};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Statistics about queue manager operations
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueManagerStats {
    pub queues_created: u64,
    pub queues_removed: u64,
    pub players_subscribed: u64,
    pub players_wait_listed: u64,
    pub promotions: u64,
    pub games_started: u64,
    pub games_stopped: u64,
}

/// Result of an `add`
#[derive(Debug, Clone)]
pub struct AddResult {
    pub queue: PickupQueue,
    pub outcome: SubscribeOutcome,
    /// The add filled the queue and auto-start launched the game
    pub started: bool,
}

/// Result of a `leave`
#[derive(Debug, Clone)]
pub struct LeaveResult {
    /// The queue after the leave, or `None` when it became empty and was removed
    pub queue: Option<PickupQueue>,
    pub outcome: LeaveOutcome,
}

/// The queue lifecycle engine
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    platform: Arc<dyn ChatPlatform>,
    moderation: Arc<dyn ModerationCheck>,
    session: Arc<SessionController>,
    server_link: Option<GameServerLink>,
    settings: PickupSettings,
    locks: Arc<QueueLocks>,
    stats: Arc<RwLock<QueueManagerStats>>,
    metrics_collector: Arc<MetricsCollector>,
}

impl QueueManager {
    /// Create a manager whose session controller allocates voice channels but
    /// announces nothing in game
    pub fn new(
        store: Arc<dyn QueueStore>,
        platform: Arc<dyn ChatPlatform>,
        moderation: Arc<dyn ModerationCheck>,
        settings: PickupSettings,
    ) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        let session = Arc::new(SessionController::new(
            platform.clone(),
            settings.voice_category.clone(),
        ));

        Self {
            store,
            platform,
            moderation,
            session,
            server_link: None,
            settings,
            locks: Arc::new(QueueLocks::new()),
            stats: Arc::new(RwLock::new(QueueManagerStats::default())),
            metrics_collector,
        }
    }

    pub fn with_session(mut self, session: Arc<SessionController>) -> Self {
        self.session = session;
        self
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = metrics_collector;
        self
    }

    pub fn with_server_link(mut self, server_link: GameServerLink) -> Self {
        self.server_link = Some(server_link);
        self
    }

    pub fn settings(&self) -> &PickupSettings {
        &self.settings
    }

    /// Create a queue and subscribe its owner
    pub async fn create(
        &self,
        guild_id: GuildId,
        name: &str,
        team_size: Option<i64>,
        operators: &str,
        owner: Subscriber,
    ) -> Result<PickupQueue> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PickupError::InvalidRequest {
                reason: "a queue needs a name".to_string(),
            }
            .into());
        }

        let _guard = self.locks.lock(guild_id, name).await?;

        if self.store.get(guild_id, name).await?.is_some() {
            return Err(PickupError::DuplicateQueue {
                name: name.to_string(),
            }
            .into());
        }
        self.ensure_not_flagged(guild_id, owner.id).await?;

        let flags = parse_operators(operators);
        let team_size = self.resolve_team_size(team_size, flags.as_ref());
        let team_size = team_size.unwrap_or(self.settings.default_team_size);

        let mut queue = PickupQueue::new(guild_id, name, &owner, team_size);
        if let Some(flags) = &flags {
            queue = queue.with_operators(flags);
        }
        let (queue, _) = queue.subscribe(owner.clone());

        self.persist(&queue).await?;
        info!(
            "Created queue '{}' in guild {} - owner: {}, team_size: {}, coop: {}, rcon: {}",
            queue.name(),
            guild_id,
            owner.name,
            queue.team_size(),
            queue.is_coop(),
            queue.rcon_enabled()
        );

        self.update_stats(|stats| {
            stats.queues_created += 1;
            stats.players_subscribed += 1;
        })?;
        self.metrics_collector.record_queue_created();
        self.metrics_collector.record_subscription("subscribers");

        let queue = self.render(queue).await;
        self.publish(
            guild_id,
            PickupEvent::QueueCreated {
                queue_name: queue.name().to_string(),
                owner,
            },
        )
        .await;

        Ok(queue)
    }

    /// Add a user to a queue, or to the best queue of the guild when no name is given
    pub async fn add(
        &self,
        guild_id: GuildId,
        name: Option<&str>,
        subscriber: Subscriber,
    ) -> Result<AddResult> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => self.default_queue_name(guild_id).await?,
        };

        let _guard = self.locks.lock(guild_id, &name).await?;
        let queue = self.fetch(guild_id, &name).await?;

        if queue.membership(subscriber.id).is_some() {
            debug!(
                "User {} is already in queue '{}', nothing to do",
                subscriber.id,
                queue.name()
            );
            let (queue, outcome) = queue.subscribe(subscriber);
            return Ok(AddResult {
                queue,
                outcome,
                started: false,
            });
        }
        self.ensure_not_flagged(guild_id, subscriber.id).await?;

        let (next, outcome) = queue.subscribe(subscriber.clone());
        self.persist(&next).await?;

        match &outcome {
            SubscribeOutcome::Subscribed { filled } => {
                info!(
                    "User {} joined queue '{}' ({}/{}, filled: {})",
                    subscriber.id,
                    next.name(),
                    next.subscribers().len(),
                    next.max_in_queue(),
                    filled
                );
                self.update_stats(|stats| stats.players_subscribed += 1)?;
                self.metrics_collector.record_subscription("subscribers");
            }
            SubscribeOutcome::WaitListed { position } => {
                info!(
                    "User {} wait-listed on queue '{}' at position {}",
                    subscriber.id,
                    next.name(),
                    position
                );
                self.update_stats(|stats| stats.players_wait_listed += 1)?;
                self.metrics_collector.record_subscription("wait_list");
            }
            _ => {}
        }

        let next = self.render(next).await;

        match &outcome {
            SubscribeOutcome::Subscribed { filled } => {
                self.publish(
                    guild_id,
                    PickupEvent::PlayerJoined {
                        queue_name: next.name().to_string(),
                        subscriber,
                        readiness: next.readiness(),
                    },
                )
                .await;

                if *filled {
                    self.announce_full(&next).await;
                }
            }
            SubscribeOutcome::WaitListed { position } => {
                self.publish(
                    guild_id,
                    PickupEvent::PlayerWaitListed {
                        queue_name: next.name().to_string(),
                        subscriber,
                        position: *position,
                    },
                )
                .await;
            }
            _ => {}
        }

        let filled = matches!(outcome, SubscribeOutcome::Subscribed { filled: true });
        if filled && self.settings.auto_start_when_full && !next.is_started() {
            let started = self.launch(next).await?;
            return Ok(AddResult {
                queue: started,
                outcome,
                started: true,
            });
        }

        Ok(AddResult {
            queue: next,
            outcome,
            started: false,
        })
    }

    /// Take a user out of a queue
    ///
    /// A queue left with nobody in either list is removed, and the removal
    /// notice replaces the leave notice. `notify` set to false suppresses the
    /// channel notices but not the direct message to a promoted user.
    pub async fn leave(
        &self,
        guild_id: GuildId,
        name: &str,
        user_id: UserId,
        notify: bool,
    ) -> Result<LeaveResult> {
        let _guard = self.locks.lock(guild_id, name).await?;
        let queue = self.fetch(guild_id, name).await?;

        let (next, outcome) = queue.leave(user_id);
        if outcome == LeaveOutcome::NotMember {
            return Ok(LeaveResult {
                queue: Some(queue),
                outcome,
            });
        }

        if next.is_empty() {
            let next = if next.is_started() {
                self.session.teardown(&next).await?
            } else {
                next
            };
            self.remove_queue(&next, "empty", notify).await?;
            info!(
                "Queue '{}' in guild {} removed after its last user left",
                next.name(),
                guild_id
            );
            return Ok(LeaveResult {
                queue: None,
                outcome,
            });
        }

        self.persist(&next).await?;
        let next = self.render(next).await;

        match &outcome {
            LeaveOutcome::Left {
                subscriber,
                promoted,
            } => {
                info!(
                    "User {} left queue '{}'{}",
                    subscriber.id,
                    next.name(),
                    promoted
                        .as_ref()
                        .map(|p| format!(", {} promoted from the waiting list", p.id))
                        .unwrap_or_default()
                );
                if let Some(promoted) = promoted {
                    self.record_promotions(1)?;
                    self.direct(
                        promoted.id,
                        PickupEvent::WaitListPromoted {
                            queue_name: next.name().to_string(),
                            subscriber: promoted.clone(),
                        },
                    )
                    .await;
                }
                if notify {
                    self.publish(
                        guild_id,
                        PickupEvent::PlayerLeft {
                            queue_name: next.name().to_string(),
                            subscriber: subscriber.clone(),
                            promoted: promoted.clone(),
                        },
                    )
                    .await;
                }
            }
            LeaveOutcome::LeftWaitList { subscriber } => {
                info!(
                    "User {} left the waiting list of '{}'",
                    subscriber.id,
                    next.name()
                );
                if notify {
                    self.publish(
                        guild_id,
                        PickupEvent::PlayerLeft {
                            queue_name: next.name().to_string(),
                            subscriber: subscriber.clone(),
                            promoted: None,
                        },
                    )
                    .await;
                }
            }
            LeaveOutcome::NotMember => {}
        }

        Ok(LeaveResult {
            queue: Some(next),
            outcome,
        })
    }

    /// Take a user out of every queue of the guild with a single notice
    ///
    /// Returns the names of the queues the user was removed from.
    pub async fn clear(&self, guild_id: GuildId, user_id: UserId) -> Result<Vec<String>> {
        let candidates: Vec<String> = self
            .store
            .list_by_guild(guild_id)
            .await?
            .into_iter()
            .filter(|queue| queue.membership(user_id).is_some())
            .map(|queue| queue.name().to_string())
            .collect();

        let mut cleared = Vec::new();
        let mut departed: Option<Subscriber> = None;
        for name in candidates {
            let result = match self.leave(guild_id, &name, user_id, false).await {
                Ok(result) => result,
                Err(e) if is_missing_queue(&e) => continue,
                Err(e) => return Err(e),
            };
            match result.outcome {
                LeaveOutcome::Left { subscriber, .. } | LeaveOutcome::LeftWaitList { subscriber } => {
                    departed.get_or_insert(subscriber);
                    cleared.push(name);
                }
                LeaveOutcome::NotMember => {}
            }
        }

        if let Some(subscriber) = departed {
            info!(
                "Cleared user {} from {} queue(s) in guild {}",
                user_id,
                cleared.len(),
                guild_id
            );
            self.publish(
                guild_id,
                PickupEvent::UserCleared {
                    subscriber,
                    queues: cleared.clone(),
                },
            )
            .await;
        }

        Ok(cleared)
    }

    /// Rename a queue, keeping both lists, timestamps and settings
    pub async fn rename(
        &self,
        guild_id: GuildId,
        old_name: &str,
        new_name: &str,
        requester: &Requester,
    ) -> Result<PickupQueue> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(PickupError::InvalidRequest {
                reason: "the new queue name is empty".to_string(),
            }
            .into());
        }

        let _guards = self.locks.lock_pair(guild_id, old_name, new_name).await?;
        let queue = self.fetch(guild_id, old_name).await?;
        ensure_owner_or_admin(&queue, requester)?;

        let same_key = queue.key() == queue_key(new_name);
        if !same_key && self.store.get(guild_id, new_name).await?.is_some() {
            return Err(PickupError::DuplicateQueue {
                name: new_name.to_string(),
            }
            .into());
        }

        let renamed = queue.renamed(new_name);
        self.persist(&renamed).await?;
        if !same_key {
            self.store.delete(guild_id, queue.name()).await?;
        }
        info!(
            "Renamed queue '{}' to '{}' in guild {}",
            queue.name(),
            renamed.name(),
            guild_id
        );

        let renamed = self.render(renamed).await;
        self.publish(
            guild_id,
            PickupEvent::QueueRenamed {
                old_name: queue.name().to_string(),
                new_name: renamed.name().to_string(),
            },
        )
        .await;

        Ok(renamed)
    }

    /// Change a queue's settings and team size
    pub async fn update(
        &self,
        guild_id: GuildId,
        name: &str,
        operators: &str,
        team_size: Option<i64>,
        requester: &Requester,
    ) -> Result<PickupQueue> {
        let _guard = self.locks.lock(guild_id, name).await?;
        let queue = self.fetch(guild_id, name).await?;
        ensure_owner_or_admin(&queue, requester)?;

        let flags = parse_operators(operators);
        let team_size = self.resolve_team_size(team_size, flags.as_ref());

        let mut next = queue.clone();
        if let Some(flags) = &flags {
            next = next.with_operators(flags);
        }

        // Running teams were formed for the current size and mode
        let resized = team_size.is_some_and(|size| size != queue.team_size());
        let mode_changed = next.is_coop() != queue.is_coop();
        if queue.is_started() && (resized || mode_changed) {
            return Err(PickupError::QueueStarted {
                name: queue.name().to_string(),
            }
            .into());
        }
        if let Some(size) = team_size {
            next = next.with_team_size(size);
        }

        self.persist(&next).await?;
        info!(
            "Updated queue '{}' in guild {} - team_size: {}, coop: {}, rcon: {}",
            next.name(),
            guild_id,
            next.team_size(),
            next.is_coop(),
            next.rcon_enabled()
        );

        let promoted: Vec<Subscriber> = next
            .subscribers()
            .iter()
            .filter(|s| !queue.subscribers().contains(s))
            .cloned()
            .collect();
        if !promoted.is_empty() {
            self.record_promotions(promoted.len() as u64)?;
        }

        let next = self.render(next).await;
        for subscriber in promoted {
            self.direct(
                subscriber.id,
                PickupEvent::WaitListPromoted {
                    queue_name: next.name().to_string(),
                    subscriber: subscriber.clone(),
                },
            )
            .await;
        }
        self.publish(
            guild_id,
            PickupEvent::QueueUpdated {
                queue_name: next.name().to_string(),
            },
        )
        .await;

        Ok(next)
    }

    /// Remove a queue that is not running
    pub async fn delete(&self, guild_id: GuildId, name: &str, requester: &Requester) -> Result<()> {
        let _guard = self.locks.lock(guild_id, name).await?;
        let queue = self.fetch(guild_id, name).await?;
        ensure_owner_or_admin(&queue, requester)?;

        if queue.is_started() {
            return Err(PickupError::QueueStarted {
                name: queue.name().to_string(),
            }
            .into());
        }

        self.remove_queue(&queue, "deleted", true).await?;
        info!("Deleted queue '{}' in guild {}", queue.name(), guild_id);
        Ok(())
    }

    /// All queues of a guild, most ready first
    pub async fn list(&self, guild_id: GuildId) -> Result<Vec<PickupQueue>> {
        let mut queues = self.store.list_by_guild(guild_id).await?;
        order_by_readiness(&mut queues);
        Ok(queues)
    }

    pub async fn get(&self, guild_id: GuildId, name: &str) -> Result<Option<PickupQueue>> {
        self.store.get(guild_id, name).await
    }

    /// The waiting list of a queue, first in line first
    pub async fn waitlist(&self, guild_id: GuildId, name: &str) -> Result<Vec<Subscriber>> {
        let queue = self.fetch(guild_id, name).await?;
        Ok(queue.wait_list().iter().cloned().collect())
    }

    /// Split a queue into teams and start the game
    ///
    /// Returns `None` without changing anything when the queue already runs,
    /// has nobody in it, or the requester is neither in the queue, its owner
    /// nor an administrator.
    pub async fn start(
        &self,
        guild_id: GuildId,
        name: &str,
        requester: &Requester,
    ) -> Result<Option<PickupQueue>> {
        let _guard = self.locks.lock(guild_id, name).await?;
        let queue = self.fetch(guild_id, name).await?;

        if queue.is_started() || queue.subscribers().is_empty() {
            debug!(
                "Not starting queue '{}' (started: {}, subscribers: {})",
                queue.name(),
                queue.is_started(),
                queue.subscribers().len()
            );
            return Ok(None);
        }

        let allowed = requester.is_admin
            || requester.id() == queue.owner_id()
            || queue.membership(requester.id()) == Some(Membership::Subscriber);
        if !allowed {
            debug!(
                "User {} may not start queue '{}'",
                requester.id(),
                queue.name()
            );
            return Ok(None);
        }

        self.launch(queue).await.map(Some)
    }

    /// Re-publish the teams of a started queue
    pub async fn teams(&self, guild_id: GuildId, name: &str) -> Result<Vec<Team>> {
        let queue = self.fetch(guild_id, name).await?;
        if queue.is_started() {
            self.publish(
                guild_id,
                PickupEvent::TeamsReady {
                    queue_name: queue.name().to_string(),
                    teams: queue.teams().to_vec(),
                },
            )
            .await;
        }
        Ok(queue.teams().to_vec())
    }

    /// End a queue's game, release its voice channels and remove the queue
    pub async fn stop(&self, guild_id: GuildId, name: &str, requester: &Requester) -> Result<()> {
        let _guard = self.locks.lock(guild_id, name).await?;
        let queue = self.fetch(guild_id, name).await?;
        ensure_owner_or_admin(&queue, requester)?;

        let queue = if queue.is_started() {
            let stopped = self.session.teardown(&queue).await?;
            self.update_stats(|stats| stats.games_stopped += 1)?;
            self.metrics_collector.record_game_stopped();
            self.publish(
                guild_id,
                PickupEvent::QueueStopped {
                    queue_name: stopped.name().to_string(),
                },
            )
            .await;
            stopped
        } else {
            queue
        };

        self.remove_queue(&queue, "stopped", true).await?;
        info!("Stopped queue '{}' in guild {}", queue.name(), guild_id);
        Ok(())
    }

    /// Ask the promotion role to fill a queue, or every open queue
    ///
    /// Members already in the queue are skipped. Returns the number of direct
    /// messages sent.
    pub async fn promote(&self, guild_id: GuildId, name: Option<&str>) -> Result<usize> {
        let queues = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => vec![self.fetch(guild_id, name).await?],
            None => self
                .list(guild_id)
                .await?
                .into_iter()
                .filter(|q| !q.is_full() && !q.is_started())
                .collect(),
        };

        let members = self
            .platform
            .role_members(guild_id, &self.settings.promotion_role)
            .await?;

        let mut sent = 0;
        for queue in &queues {
            let event = PickupEvent::QueuePromoted {
                queue_name: queue.name().to_string(),
                missing_players: queue.missing_players(),
            };
            self.publish(guild_id, event.clone()).await;

            for &member in members.iter().filter(|&&m| queue.membership(m).is_none()) {
                if self.direct(member, event.clone()).await {
                    sent += 1;
                }
            }
            info!(
                "Promoted queue '{}' ({} missing) to role '{}'",
                queue.name(),
                queue.missing_players(),
                self.settings.promotion_role
            );
        }

        Ok(sent)
    }

    /// Toggle the user's membership of the promotion role
    pub async fn subscribe_promotions(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let member = self
            .platform
            .toggle_role(guild_id, user_id, &self.settings.promotion_role)
            .await?;
        info!(
            "User {} {} promotion role '{}'",
            user_id,
            if member { "joined" } else { "left" },
            self.settings.promotion_role
        );
        Ok(member)
    }

    /// Run the add or leave a reaction on a queue summary stands for
    ///
    /// Reactions on messages that are not queue summaries are ignored.
    pub async fn react(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
        subscriber: Subscriber,
        kind: ReactionKind,
    ) -> Result<Option<PickupQueue>> {
        let Some(queue) = self
            .store
            .find_by_rendered_message_id(message_id, guild_id)
            .await?
        else {
            debug!("Reaction on message {} is not on a queue summary", message_id);
            return Ok(None);
        };

        match kind {
            ReactionKind::Join => self
                .add(guild_id, Some(queue.name()), subscriber)
                .await
                .map(|result| Some(result.queue)),
            ReactionKind::Leave => self
                .leave(guild_id, queue.name(), subscriber.id, true)
                .await
                .map(|result| result.queue),
        }
    }

    /// Status of the queue's game server; `None` when unavailable this time
    pub async fn server_status(
        &self,
        guild_id: GuildId,
        name: &str,
    ) -> Result<Option<ServerStatus>> {
        let queue = self.fetch(guild_id, name).await?;
        let (Some(link), Some((host, port))) = (&self.server_link, queue.server_address()) else {
            return Ok(None);
        };

        match link.status(host, port).await {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!("Status of '{}' unavailable: {}", queue.name(), e);
                Ok(None)
            }
        }
    }

    /// Userinfo of a player on the queue's game server; `None` when unavailable
    pub async fn client_info(
        &self,
        guild_id: GuildId,
        name: &str,
        player: &str,
    ) -> Result<Option<ClientInfo>> {
        let queue = self.fetch(guild_id, name).await?;
        let (Some(link), Some((host, port))) = (&self.server_link, queue.server_address()) else {
            return Ok(None);
        };

        match link.client_info(host, port, player).await {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                warn!(
                    "Client info for '{}' on '{}' unavailable: {}",
                    player,
                    queue.name(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Get manager statistics
    pub async fn get_stats(&self) -> Result<QueueManagerStats> {
        let stats = self.stats.read().map_err(|_| PickupError::InternalError {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    /// Start a queue the caller already holds the lock for
    async fn launch(&self, queue: PickupQueue) -> Result<PickupQueue> {
        let started = self.session.start(&queue).await?;
        self.persist(&started).await?;

        self.update_stats(|stats| stats.games_started += 1)?;
        self.metrics_collector
            .record_game_started(started.is_coop(), started.readiness());

        let started = self.render(started).await;
        self.publish(
            started.guild_id(),
            PickupEvent::TeamsReady {
                queue_name: started.name().to_string(),
                teams: started.teams().to_vec(),
            },
        )
        .await;

        let armed = self.session.arm_announcements(&started);
        if !armed.is_empty() {
            debug!(
                "Armed {} announcement(s) for '{}'",
                armed.len(),
                started.name()
            );
        }

        Ok(started)
    }

    async fn default_queue_name(&self, guild_id: GuildId) -> Result<String> {
        let queues = self.store.list_by_guild(guild_id).await?;
        select_default_queue(&queues)
            .map(|queue| queue.name().to_string())
            .ok_or_else(|| {
                PickupError::NoSuchQueue {
                    name: "any".to_string(),
                }
                .into()
            })
    }

    async fn fetch(&self, guild_id: GuildId, name: &str) -> Result<PickupQueue> {
        self.store.get(guild_id, name).await?.ok_or_else(|| {
            PickupError::NoSuchQueue {
                name: name.trim().to_string(),
            }
            .into()
        })
    }

    async fn ensure_not_flagged(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        if let Some(reason) = self.moderation.is_flagged(user_id, guild_id).await? {
            warn!("Refusing flagged user {} in guild {}: {}", user_id, guild_id, reason);
            return Err(PickupError::UserFlagged { user_id, reason }.into());
        }
        Ok(())
    }

    fn resolve_team_size(
        &self,
        explicit: Option<i64>,
        flags: Option<&OperatorFlags>,
    ) -> Option<usize> {
        explicit
            .or_else(|| {
                flags
                    .and_then(|f| f.first_value("-teamsize"))
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .map(|size| clamp_team_size(size, self.settings.max_team_size))
    }

    async fn persist(&self, queue: &PickupQueue) -> Result<()> {
        if !self.store.put(queue).await? {
            return Err(PickupError::StoreFailure {
                message: format!("write of queue '{}' was rejected", queue.name()),
            }
            .into());
        }
        Ok(())
    }

    /// Refresh the queue summary and remember its message id
    async fn render(&self, queue: PickupQueue) -> PickupQueue {
        let message_id = match self.platform.render_queue(&queue).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to render queue '{}': {}", queue.name(), e);
                return queue;
            }
        };
        if queue.static_message_id() == Some(message_id) {
            return queue;
        }

        let queue = queue.with_message_id(Some(message_id));
        match self.store.put(&queue).await {
            Ok(true) => {}
            Ok(false) => warn!("Message id of queue '{}' was not stored", queue.name()),
            Err(e) => warn!("Failed to store message id of '{}': {}", queue.name(), e),
        }
        queue
    }

    async fn remove_queue(&self, queue: &PickupQueue, reason: &str, notify: bool) -> Result<()> {
        self.store.delete(queue.guild_id(), queue.name()).await?;
        self.update_stats(|stats| stats.queues_removed += 1)?;
        self.metrics_collector.record_queue_removed(reason);

        if let Some(message_id) = queue.static_message_id() {
            if let Err(e) = self
                .platform
                .remove_queue_message(queue.guild_id(), message_id)
                .await
            {
                warn!("Failed to remove summary of '{}': {}", queue.name(), e);
            }
        }
        if notify {
            self.publish(
                queue.guild_id(),
                PickupEvent::QueueRemoved {
                    queue_name: queue.name().to_string(),
                },
            )
            .await;
        }
        Ok(())
    }

    async fn announce_full(&self, queue: &PickupQueue) {
        let event = PickupEvent::QueueFull {
            queue_name: queue.name().to_string(),
            subscribers: queue.subscribers().to_vec(),
        };
        self.publish(queue.guild_id(), event.clone()).await;
        for subscriber in queue.subscribers() {
            self.direct(subscriber.id, event.clone()).await;
        }
    }

    async fn publish(&self, guild_id: GuildId, event: PickupEvent) {
        let kind = event.kind();
        if let Err(e) = self.platform.publish_event(guild_id, event).await {
            warn!("Failed to publish {} in guild {}: {}", kind, guild_id, e);
        }
    }

    async fn direct(&self, user_id: UserId, event: PickupEvent) -> bool {
        let kind = event.kind();
        match self.platform.direct_message(user_id, event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} to user {}: {}", kind, user_id, e);
                false
            }
        }
    }

    fn record_promotions(&self, count: u64) -> Result<()> {
        self.update_stats(|stats| stats.promotions += count)?;
        for _ in 0..count {
            self.metrics_collector.record_promotion();
        }
        Ok(())
    }

    fn update_stats(&self, update: impl FnOnce(&mut QueueManagerStats)) -> Result<()> {
        let mut stats = self.stats.write().map_err(|_| PickupError::InternalError {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        update(&mut stats);
        Ok(())
    }
}

fn ensure_owner_or_admin(queue: &PickupQueue, requester: &Requester) -> Result<()> {
    if requester.is_admin || requester.id() == queue.owner_id() {
        return Ok(());
    }
    Err(PickupError::PermissionDenied {
        reason: format!(
            "only the owner of '{}' or an administrator can do that",
            queue.name()
        ),
    }
    .into())
}

fn is_missing_queue(error: &anyhow::Error) -> bool {
    matches!(
        crate::error::pickup_error(error),
        Some(PickupError::NoSuchQueue { .. })
    )
}
