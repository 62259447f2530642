//! Delayed in-game roster announcements
//!
//! Each delay gets its own detached one-shot task. A task only sees the
//! roster snapshot taken at start time, never the live queue, so a `stop`
//! racing with a timer cannot change what gets announced. Timers live in
//! memory only and are lost on restart.

use crate::metrics::MetricsCollector;
use crate::rcon::GameServerLink;
use crate::types::{RosterSnapshot, TeamSide};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Handle to one armed announcement
#[derive(Debug)]
pub struct ScheduledAnnouncement {
    pub id: Uuid,
    pub delay: Duration,
    handle: JoinHandle<()>,
}

impl ScheduledAnnouncement {
    /// Cancel this announcement only; siblings keep running
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Arms the fixed-delay announcements for a started queue
pub struct AnnouncementScheduler {
    link: GameServerLink,
    delays: Vec<Duration>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AnnouncementScheduler {
    pub fn new(link: GameServerLink, delays: Vec<Duration>) -> Self {
        Self {
            link,
            delays,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Spawn one task per delay, each announcing the same snapshot
    pub fn schedule(&self, snapshot: RosterSnapshot) -> Vec<ScheduledAnnouncement> {
        let snapshot = Arc::new(snapshot);
        let message = Arc::new(roster_message(&snapshot));

        self.delays
            .iter()
            .map(|&delay| {
                let id = crate::utils::generate_task_id();
                let link = self.link.clone();
                let metrics = self.metrics.clone();
                let snapshot = snapshot.clone();
                let message = message.clone();

                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let result = link.say(&snapshot.host, snapshot.port, &message).await;

                    if let Some(metrics) = &metrics {
                        metrics.record_announcement(result.is_ok());
                    }
                    match result {
                        Ok(()) => info!(
                            "Announced teams of '{}' on {}:{} after {}s",
                            snapshot.queue_name,
                            snapshot.host,
                            snapshot.port,
                            delay.as_secs()
                        ),
                        Err(e) => warn!(
                            "Announcement {} for '{}' failed: {}",
                            id, snapshot.queue_name, e
                        ),
                    }
                });

                ScheduledAnnouncement { id, delay, handle }
            })
            .collect()
    }
}

fn side_color(side: TeamSide) -> &'static str {
    match side {
        TeamSide::Red => "^1",
        TeamSide::Blue => "^4",
        TeamSide::Coop => "^2",
    }
}

/// Chat line listing each team's players, using in-game color codes
pub fn roster_message(snapshot: &RosterSnapshot) -> String {
    snapshot
        .teams
        .iter()
        .filter(|team| !team.subscribers.is_empty())
        .map(|team| {
            let names: Vec<&str> = team.subscribers.iter().map(|s| s.name.as_str()).collect();
            format!("{}{}:^7 {}", side_color(team.side), team.name, names.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcon::client::MockServerControl;
    use crate::rcon::StaticSecretsStore;
    use crate::types::{Subscriber, Team};
    use mockall::predicate::*;

    fn snapshot() -> RosterSnapshot {
        RosterSnapshot {
            guild_id: 1,
            queue_name: "ctf".to_string(),
            host: "127.0.0.1".to_string(),
            port: 27960,
            teams: vec![
                Team::new(
                    TeamSide::Red,
                    vec![Subscriber::new(1, "alpha"), Subscriber::new(2, "bravo")],
                ),
                Team::new(TeamSide::Blue, vec![Subscriber::new(3, "charlie")]),
            ],
            taken_at: crate::utils::current_timestamp(),
        }
    }

    fn link(control: MockServerControl) -> GameServerLink {
        let mut secrets = StaticSecretsStore::default();
        secrets.insert("127.0.0.1", 27960, "pw");
        GameServerLink::new(Arc::new(control), Arc::new(secrets))
    }

    #[test]
    fn test_roster_message() {
        assert_eq!(
            roster_message(&snapshot()),
            "^1Red Team:^7 alpha, bravo ^4Blue Team:^7 charlie"
        );
    }

    #[tokio::test]
    async fn test_every_delay_fires_independently() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .with(
                eq("say \"^1Red Team:^7 alpha, bravo ^4Blue Team:^7 charlie\""),
                eq("127.0.0.1"),
                eq("pw"),
                eq(27960),
                eq(true),
            )
            .times(2)
            .returning(|_, _, _, _, _| Ok(String::new()));

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let scheduler = AnnouncementScheduler::new(
            link(control),
            vec![Duration::from_millis(10), Duration::from_millis(20)],
        )
        .with_metrics(metrics.clone());

        let armed = scheduler.schedule(snapshot());
        assert_eq!(armed.len(), 2);
        assert_ne!(armed[0].id, armed[1].id);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(armed.iter().all(|a| a.is_finished()));
        assert_eq!(
            metrics
                .rcon()
                .announcements_total
                .with_label_values(&["sent"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn test_cancelling_one_leaves_the_other() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .times(1)
            .returning(|_, _, _, _, _| Ok(String::new()));

        let scheduler = AnnouncementScheduler::new(
            link(control),
            vec![Duration::from_millis(10), Duration::from_millis(200)],
        );
        let armed = scheduler.schedule(snapshot());
        armed[1].cancel();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(armed[0].is_finished());
        assert!(armed[1].is_finished());
    }

    #[tokio::test]
    async fn test_failed_announcement_does_not_affect_sibling() {
        let mut control = MockServerControl::new();
        let mut calls = 0;
        control
            .expect_send_command()
            .times(2)
            .returning(move |_, host, _, port, _| {
                calls += 1;
                if calls == 1 {
                    Err(crate::error::PickupError::RconUnreachable {
                        address: format!("{}:{}", host, port),
                        message: "refused".to_string(),
                    }
                    .into())
                } else {
                    Ok(String::new())
                }
            });

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let scheduler = AnnouncementScheduler::new(
            link(control),
            vec![Duration::from_millis(10), Duration::from_millis(30)],
        )
        .with_metrics(metrics.clone());
        let _armed = scheduler.schedule(snapshot());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let announcements = &metrics.rcon().announcements_total;
        assert_eq!(announcements.with_label_values(&["failed"]).get(), 1);
        assert_eq!(announcements.with_label_values(&["sent"]).get(), 1);
    }
}
