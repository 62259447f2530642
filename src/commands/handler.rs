//! Command dispatch
//!
//! Turns a parsed [`PickupCommand`] into a call on the [`QueueManager`] and
//! a short text reply for the issuing user. Rich rendering of queues and
//! notices is the chat platform's job; the reply only confirms what happened.

use crate::commands::parser::{parse_command, PickupCommand};
use crate::error::{pickup_error, Result};
use crate::metrics::MetricsCollector;
use crate::platform::Actor;
use crate::queue::{LeaveOutcome, QueueManager, SubscribeOutcome};
use crate::types::{GuildId, Requester, Subscriber, Team};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// What the issuing user is told
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// The command ran
    Done(String),
    /// The command was refused for a reason the user can act on
    Rejected(String),
}

impl CommandReply {
    pub fn text(&self) -> &str {
        match self {
            CommandReply::Done(text) | CommandReply::Rejected(text) => text,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandReply::Rejected(_))
    }
}

/// Executes text commands against a queue manager
pub struct CommandHandler {
    manager: Arc<QueueManager>,
    metrics_collector: Arc<MetricsCollector>,
}

impl CommandHandler {
    pub fn new(manager: Arc<QueueManager>, metrics_collector: Arc<MetricsCollector>) -> Self {
        Self {
            manager,
            metrics_collector,
        }
    }

    pub fn manager(&self) -> &Arc<QueueManager> {
        &self.manager
    }

    /// Parse and run one command line
    ///
    /// User-facing failures become [`CommandReply::Rejected`]; store, platform
    /// and internal failures are returned as errors.
    pub async fn handle(
        &self,
        guild_id: GuildId,
        actor: &dyn Actor,
        line: &str,
    ) -> Result<CommandReply> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                debug!("Rejected command line '{}': {}", line, e);
                return Ok(CommandReply::Rejected(e.to_string()));
            }
        };

        let started = Instant::now();
        let label = command.name();
        let result = self.execute(guild_id, actor, command).await;

        let (outcome, reply) = match result {
            Ok(text) => ("ok", Ok(CommandReply::Done(text))),
            Err(e) => match pickup_error(&e).filter(|p| p.is_user_facing()) {
                Some(user_error) => (
                    "rejected",
                    Ok(CommandReply::Rejected(user_error.to_string())),
                ),
                None => {
                    error!("Command '{}' from {} failed: {}", label, actor.id(), e);
                    ("failed", Err(e))
                }
            },
        };
        self.metrics_collector
            .record_command(label, outcome, started.elapsed());
        reply
    }

    /// Run an already parsed command
    pub async fn execute(
        &self,
        guild_id: GuildId,
        actor: &dyn Actor,
        command: PickupCommand,
    ) -> Result<String> {
        let subscriber = Subscriber::from_actor(actor);
        let requester = Requester::from_actor(actor);

        let text = match command {
            PickupCommand::Create {
                name,
                team_size,
                operators,
            } => {
                let queue = self
                    .manager
                    .create(guild_id, &name, team_size, &operators, subscriber)
                    .await?;
                format!(
                    "Created queue '{}' for {} players",
                    queue.name(),
                    queue.max_in_queue()
                )
            }
            PickupCommand::Rename { old_name, new_name } => {
                let queue = self
                    .manager
                    .rename(guild_id, &old_name, &new_name, &requester)
                    .await?;
                format!("Renamed queue '{}' to '{}'", old_name, queue.name())
            }
            PickupCommand::Update {
                name,
                team_size,
                operators,
            } => {
                let queue = self
                    .manager
                    .update(guild_id, &name, &operators, team_size, &requester)
                    .await?;
                format!(
                    "Updated queue '{}' ({} players)",
                    queue.name(),
                    queue.max_in_queue()
                )
            }
            PickupCommand::Delete { name } => {
                self.manager.delete(guild_id, &name, &requester).await?;
                format!("Deleted queue '{}'", name)
            }
            PickupCommand::List => {
                let queues = self.manager.list(guild_id).await?;
                if queues.is_empty() {
                    "No queues".to_string()
                } else {
                    queues
                        .iter()
                        .map(|q| {
                            format!(
                                "{} [{}/{}] {}%",
                                q.name(),
                                q.subscribers().len(),
                                q.max_in_queue(),
                                q.readiness()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            PickupCommand::WaitList { name } => {
                let waiting = self.manager.waitlist(guild_id, &name).await?;
                if waiting.is_empty() {
                    format!("Nobody is waiting for '{}'", name)
                } else {
                    format!("Waiting for '{}': {}", name, names(&waiting))
                }
            }
            PickupCommand::Promote { name } => {
                let sent = self.manager.promote(guild_id, name.as_deref()).await?;
                format!("Promotion sent to {} players", sent)
            }
            PickupCommand::Start { name } => {
                match self.manager.start(guild_id, &name, &requester).await? {
                    Some(queue) => format!(
                        "Started queue '{}': {}",
                        queue.name(),
                        describe_teams(queue.teams())
                    ),
                    None => format!("Queue '{}' was not started", name),
                }
            }
            PickupCommand::Teams { name } => {
                let teams = self.manager.teams(guild_id, &name).await?;
                if teams.is_empty() {
                    format!("Queue '{}' has not started", name)
                } else {
                    describe_teams(&teams)
                }
            }
            PickupCommand::Stop { name } => {
                self.manager.stop(guild_id, &name, &requester).await?;
                format!("Stopped queue '{}'", name)
            }
            PickupCommand::Add { name } => {
                let result = self
                    .manager
                    .add(guild_id, name.as_deref(), subscriber)
                    .await?;
                let queue = &result.queue;
                let mut text = match result.outcome {
                    SubscribeOutcome::Subscribed { .. } => format!("Added to '{}'", queue.name()),
                    SubscribeOutcome::WaitListed { position } => format!(
                        "'{}' is full, you are #{} on the waiting list",
                        queue.name(),
                        position
                    ),
                    SubscribeOutcome::AlreadySubscribed => format!("Already in '{}'", queue.name()),
                    SubscribeOutcome::AlreadyWaitListed { position } => format!(
                        "Already #{} on the waiting list of '{}'",
                        position,
                        queue.name()
                    ),
                };
                if result.started {
                    text.push_str(&format!(
                        ". The game has started: {}",
                        describe_teams(queue.teams())
                    ));
                }
                text
            }
            PickupCommand::Remove { name } => {
                let result = self.manager.leave(guild_id, &name, actor.id(), true).await?;
                match result.outcome {
                    LeaveOutcome::NotMember => format!("You are not in '{}'", name),
                    _ if result.queue.is_none() => {
                        format!("Left '{}', the queue was empty and is gone", name)
                    }
                    _ => format!("Left '{}'", name),
                }
            }
            PickupCommand::Clear => {
                let cleared = self.manager.clear(guild_id, actor.id()).await?;
                if cleared.is_empty() {
                    "You were not in any queue".to_string()
                } else {
                    format!("Removed from {}", cleared.join(", "))
                }
            }
            PickupCommand::Subscribe => {
                if self
                    .manager
                    .subscribe_promotions(guild_id, actor.id())
                    .await?
                {
                    "You will be notified of promotions".to_string()
                } else {
                    "You will no longer be notified of promotions".to_string()
                }
            }
            PickupCommand::Status { name } => {
                match self.manager.server_status(guild_id, &name).await? {
                    Some(status) => {
                        let players = status
                            .players
                            .iter()
                            .map(|p| format!("{} ({})", p.clean_name, p.score))
                            .collect::<Vec<_>>();
                        format!(
                            "Map: {}, players: {}",
                            status.map.as_deref().unwrap_or("unknown"),
                            if players.is_empty() {
                                "none".to_string()
                            } else {
                                players.join(", ")
                            }
                        )
                    }
                    None => format!("Server status of '{}' is unavailable", name),
                }
            }
            PickupCommand::Player { name, player } => {
                match self.manager.client_info(guild_id, &name, &player).await? {
                    Some(info) => format!(
                        "{}: rate {}, snaps {}",
                        info.clean_name.as_deref().unwrap_or(&player),
                        info.rate.as_deref().unwrap_or("?"),
                        info.snaps.as_deref().unwrap_or("?")
                    ),
                    None => format!("No info for '{}' on '{}'", player, name),
                }
            }
        };

        Ok(text)
    }
}

fn names(subscribers: &[Subscriber]) -> String {
    subscribers
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_teams(teams: &[Team]) -> String {
    teams
        .iter()
        .map(|team| {
            format!(
                "{}: {}",
                team.side.team_name(),
                names(&team.subscribers)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PickupSettings;
    use crate::platform::{GuildMember, InMemoryModeration, RecordingChatPlatform};
    use crate::store::InMemoryQueueStore;

    const GUILD: GuildId = 7;

    fn member(id: u64, name: &str) -> GuildMember {
        GuildMember {
            id,
            username: name.to_string(),
            nickname: None,
            administrator: false,
        }
    }

    fn handler() -> (CommandHandler, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let manager = QueueManager::new(
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(RecordingChatPlatform::new()),
            Arc::new(InMemoryModeration::new()),
            PickupSettings::default(),
        )
        .with_metrics(metrics.clone());
        (CommandHandler::new(Arc::new(manager), metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_create_add_and_list() {
        let (handler, _) = handler();
        let alice = member(1, "alice");
        let bob = member(2, "bob");

        let reply = handler.handle(GUILD, &alice, "!create ctf 2").await.unwrap();
        assert_eq!(reply, CommandReply::Done("Created queue 'ctf' for 4 players".to_string()));

        let reply = handler.handle(GUILD, &bob, "add").await.unwrap();
        assert_eq!(reply.text(), "Added to 'ctf'");

        let reply = handler.handle(GUILD, &bob, "add ctf").await.unwrap();
        assert_eq!(reply.text(), "Already in 'ctf'");

        let reply = handler.handle(GUILD, &bob, "list").await.unwrap();
        assert_eq!(reply.text(), "ctf [2/4] 50%");
    }

    #[tokio::test]
    async fn test_user_errors_are_rejections() {
        let (handler, metrics) = handler();
        let alice = member(1, "alice");

        let reply = handler.handle(GUILD, &alice, "add tdm").await.unwrap();
        assert!(reply.is_rejected());
        assert!(reply.text().contains("tdm"));

        handler.handle(GUILD, &alice, "create ctf").await.unwrap();
        let reply = handler.handle(GUILD, &alice, "create CTF").await.unwrap();
        assert!(reply.is_rejected());

        let reply = handler.handle(GUILD, &alice, "juggle").await.unwrap();
        assert!(reply.is_rejected());

        let commands = metrics
            .commands()
            .commands_total
            .with_label_values(&["create", "rejected"])
            .get();
        assert_eq!(commands, 1);
    }

    #[tokio::test]
    async fn test_permission_checks() {
        let (handler, _) = handler();
        let alice = member(1, "alice");
        let bob = member(2, "bob");
        let admin = GuildMember {
            administrator: true,
            ..member(3, "root")
        };

        handler.handle(GUILD, &alice, "create ctf").await.unwrap();

        let reply = handler.handle(GUILD, &bob, "delete ctf").await.unwrap();
        assert!(reply.is_rejected());

        let reply = handler.handle(GUILD, &admin, "rename ctf \"Friday CTF\"").await.unwrap();
        assert_eq!(reply.text(), "Renamed queue 'ctf' to 'Friday CTF'");

        let reply = handler.handle(GUILD, &admin, "stop \"Friday CTF\"").await.unwrap();
        assert_eq!(reply.text(), "Stopped queue 'Friday CTF'");
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (handler, _) = handler();
        let alice = member(1, "alice");
        let bob = member(2, "bob");

        handler.handle(GUILD, &alice, "create ctf").await.unwrap();
        handler.handle(GUILD, &alice, "create tdm").await.unwrap();
        handler.handle(GUILD, &bob, "add ctf").await.unwrap();

        let reply = handler.handle(GUILD, &bob, "remove tdm").await.unwrap();
        assert_eq!(reply.text(), "You are not in 'tdm'");

        let reply = handler.handle(GUILD, &alice, "clear").await.unwrap();
        assert!(reply.text().starts_with("Removed from"));

        let reply = handler.handle(GUILD, &bob, "remove ctf").await.unwrap();
        assert_eq!(reply.text(), "Left 'ctf', the queue was empty and is gone");
    }

    #[tokio::test]
    async fn test_start_and_teams() {
        let (handler, _) = handler();
        let alice = member(1, "alice");
        let bob = member(2, "bob");

        handler.handle(GUILD, &alice, "create duel 1").await.unwrap();
        let reply = handler.handle(GUILD, &alice, "teams duel").await.unwrap();
        assert_eq!(reply.text(), "Queue 'duel' has not started");

        handler.handle(GUILD, &bob, "add duel").await.unwrap();
        let reply = handler.handle(GUILD, &alice, "start duel").await.unwrap();
        assert!(reply.text().starts_with("Started queue 'duel'"));

        let reply = handler.handle(GUILD, &alice, "teams duel").await.unwrap();
        assert!(reply.text().contains("Red Team"));
        assert!(reply.text().contains("Blue Team"));

        let reply = handler.handle(GUILD, &alice, "status duel").await.unwrap();
        assert_eq!(reply.text(), "Server status of 'duel' is unavailable");
    }
}
