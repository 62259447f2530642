//! Pickup queue entity and its state transitions
//!
//! A [`PickupQueue`] is treated as copy-on-write: every transition borrows the
//! current value and hands back a new one together with an outcome describing
//! what changed. Nothing here performs I/O.

use crate::queue::operators::OperatorFlags;
use crate::types::{GuildId, MessageId, Subscriber, Team, UserId};
use crate::utils::{current_timestamp, queue_key, readiness};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::warn;

/// Result of trying to put a user into a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The user took a spot; `filled` is set when this spot was the last one
    Subscribed { filled: bool },
    /// The queue was full and the user was appended to the waiting list
    WaitListed { position: usize },
    /// The user already holds a spot
    AlreadySubscribed,
    /// The user is already waiting
    AlreadyWaitListed { position: usize },
}

impl SubscribeOutcome {
    /// Whether the queue value changed
    pub fn changed(&self) -> bool {
        matches!(
            self,
            SubscribeOutcome::Subscribed { .. } | SubscribeOutcome::WaitListed { .. }
        )
    }
}

/// Result of taking a user out of a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// A subscriber left; the head of the waiting list took the spot if there was one
    Left {
        subscriber: Subscriber,
        promoted: Option<Subscriber>,
    },
    /// A waiting user left the waiting list
    LeftWaitList { subscriber: Subscriber },
    /// The user was in neither list
    NotMember,
}

/// Where a user currently sits in a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Subscriber,
    WaitList { position: usize },
}

/// A named matchmaking session within a guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupQueue {
    guild_id: GuildId,
    name: String,
    owner_id: UserId,
    owner_name: String,
    team_size: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_coop: bool,
    rcon_enabled: bool,
    host: Option<String>,
    port: Option<u16>,
    games: BTreeSet<String>,
    game_mode: Option<String>,
    captain_mode: bool,
    voice_enabled: bool,
    started: bool,
    static_message_id: Option<MessageId>,
    subscribers: Vec<Subscriber>,
    wait_list: VecDeque<Subscriber>,
    teams: Vec<Team>,
}

impl PickupQueue {
    /// Create an empty, open queue
    pub fn new(guild_id: GuildId, name: &str, owner: &Subscriber, team_size: usize) -> Self {
        let now = current_timestamp();
        Self {
            guild_id,
            name: name.trim().to_string(),
            owner_id: owner.id,
            owner_name: owner.name.clone(),
            team_size: team_size.max(1),
            created_at: now,
            updated_at: now,
            is_coop: false,
            rcon_enabled: false,
            host: None,
            port: None,
            games: BTreeSet::new(),
            game_mode: None,
            captain_mode: false,
            voice_enabled: true,
            started: false,
            static_message_id: None,
            subscribers: Vec::new(),
            wait_list: VecDeque::new(),
            teams: Vec::new(),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased name the store keys this queue by
    pub fn key(&self) -> String {
        queue_key(&self.name)
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_coop(&self) -> bool {
        self.is_coop
    }

    pub fn rcon_enabled(&self) -> bool {
        self.rcon_enabled
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn games(&self) -> &BTreeSet<String> {
        &self.games
    }

    pub fn game_mode(&self) -> Option<&str> {
        self.game_mode.as_deref()
    }

    pub fn captain_mode(&self) -> bool {
        self.captain_mode
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn static_message_id(&self) -> Option<MessageId> {
        self.static_message_id
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn wait_list(&self) -> &VecDeque<Subscriber> {
        &self.wait_list
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Number of spots: two teams' worth of players
    pub fn max_in_queue(&self) -> usize {
        self.team_size * 2
    }

    /// Percentage of spots taken, rounded up
    pub fn readiness(&self) -> u8 {
        readiness(self.subscribers.len(), self.max_in_queue())
    }

    pub fn is_full(&self) -> bool {
        self.subscribers.len() >= self.max_in_queue()
    }

    /// Both lists are empty
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty() && self.wait_list.is_empty()
    }

    /// Spots still open
    pub fn missing_players(&self) -> usize {
        self.max_in_queue().saturating_sub(self.subscribers.len())
    }

    /// Host and port for the game server, when both are known and RCON is on
    pub fn server_address(&self) -> Option<(&str, u16)> {
        if !self.rcon_enabled {
            return None;
        }
        match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) if !host.is_empty() => Some((host, port)),
            _ => None,
        }
    }

    /// Where the user sits in this queue, if anywhere
    pub fn membership(&self, user_id: UserId) -> Option<Membership> {
        if self.subscribers.iter().any(|s| s.id == user_id) {
            return Some(Membership::Subscriber);
        }
        self.wait_list
            .iter()
            .position(|s| s.id == user_id)
            .map(|index| Membership::WaitList {
                position: index + 1,
            })
    }

    /// Put a user into the queue, or onto the waiting list when full
    pub fn subscribe(&self, subscriber: Subscriber) -> (PickupQueue, SubscribeOutcome) {
        match self.membership(subscriber.id) {
            Some(Membership::Subscriber) => {
                return (self.clone(), SubscribeOutcome::AlreadySubscribed);
            }
            Some(Membership::WaitList { position }) => {
                return (
                    self.clone(),
                    SubscribeOutcome::AlreadyWaitListed { position },
                );
            }
            None => {}
        }

        let mut next = self.clone();
        next.touch();

        if next.is_full() {
            next.wait_list.push_back(subscriber);
            let position = next.wait_list.len();
            return (next, SubscribeOutcome::WaitListed { position });
        }

        if next.started {
            next.seat_on_smallest_team(&subscriber);
        }
        next.subscribers.push(subscriber);
        let filled = next.subscribers.len() == next.max_in_queue();
        (next, SubscribeOutcome::Subscribed { filled })
    }

    /// Take a user out of whichever list holds them
    ///
    /// A departing subscriber's spot goes to the head of the waiting list. On a
    /// started queue the promoted user also takes the departing user's place
    /// on their team.
    pub fn leave(&self, user_id: UserId) -> (PickupQueue, LeaveOutcome) {
        let mut next = self.clone();

        if let Some(index) = next.subscribers.iter().position(|s| s.id == user_id) {
            let subscriber = next.subscribers.remove(index);
            let promoted = next.wait_list.pop_front();

            if let Some(promoted) = &promoted {
                next.subscribers.push(promoted.clone());
            }
            if next.started {
                next.replace_on_team(&subscriber, promoted.as_ref());
            }

            next.touch();
            return (
                next,
                LeaveOutcome::Left {
                    subscriber,
                    promoted,
                },
            );
        }

        if let Some(index) = next.wait_list.iter().position(|s| s.id == user_id) {
            if let Some(subscriber) = next.wait_list.remove(index) {
                next.touch();
                return (next, LeaveOutcome::LeftWaitList { subscriber });
            }
        }

        (next, LeaveOutcome::NotMember)
    }

    /// Apply operator flags to the queue's settings
    pub fn with_operators(&self, flags: &OperatorFlags) -> PickupQueue {
        let mut next = self.clone();

        if flags.contains("-coop") {
            next.is_coop = true;
        }
        if flags.contains("-nocoop") {
            next.is_coop = false;
        }
        if flags.contains("-rcon") {
            next.rcon_enabled = true;
        }
        if flags.contains("-norcon") {
            next.rcon_enabled = false;
        }
        if flags.contains("-novoice") {
            next.voice_enabled = false;
        }
        if flags.contains("-captains") || flags.contains("-captain") {
            next.captain_mode = true;
        }
        if let Some(mode) = flags.first_of(&["-gamemode", "-gmode"]) {
            next.game_mode = Some(mode.to_string());
        }
        if let Some(host) = flags.first_value("-host") {
            next.host = Some(host.to_string());
        }
        if let Some(port) = flags.first_value("-port") {
            match port.parse::<u16>() {
                Ok(port) if port > 0 => next.port = Some(port),
                _ => warn!("Ignoring invalid port operator '{}' on queue '{}'", port, next.name),
            }
        }
        if let Some(games) = flags.values("-game") {
            if !games.is_empty() {
                next.games = games.iter().cloned().collect();
            }
        }

        next.touch();
        next
    }

    /// Change the team size, keeping the capacity invariants
    ///
    /// Shrinking moves the most recent joiners to the head of the waiting list
    /// in join order; growing promotes waiting users into the new spots.
    pub fn with_team_size(&self, team_size: usize) -> PickupQueue {
        let mut next = self.clone();
        next.team_size = team_size.max(1);

        let capacity = next.max_in_queue();
        if next.subscribers.len() > capacity {
            let overflow = next.subscribers.split_off(capacity);
            for subscriber in overflow.into_iter().rev() {
                next.wait_list.push_front(subscriber);
            }
        }
        while next.subscribers.len() < capacity {
            match next.wait_list.pop_front() {
                Some(promoted) => next.subscribers.push(promoted),
                None => break,
            }
        }

        next.touch();
        next
    }

    /// Same queue under a new name
    pub fn renamed(&self, new_name: &str) -> PickupQueue {
        let mut next = self.clone();
        next.name = new_name.trim().to_string();
        next.touch();
        next
    }

    /// Mark the queue started with the given teams
    pub fn with_teams(&self, teams: Vec<Team>) -> PickupQueue {
        let mut next = self.clone();
        next.teams = teams;
        next.started = true;
        next.touch();
        next
    }

    /// Drop the teams and return to the open state
    pub fn stopped(&self) -> PickupQueue {
        let mut next = self.clone();
        next.teams.clear();
        next.started = false;
        next.touch();
        next
    }

    /// Remember the rendered summary message
    pub fn with_message_id(&self, message_id: Option<MessageId>) -> PickupQueue {
        let mut next = self.clone();
        next.static_message_id = message_id;
        next
    }

    fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }

    fn replace_on_team(&mut self, departed: &Subscriber, promoted: Option<&Subscriber>) {
        for team in self.teams.iter_mut() {
            let Some(index) = team.subscribers.iter().position(|s| s == departed) else {
                continue;
            };

            match promoted {
                Some(promoted) => team.subscribers[index] = promoted.clone(),
                None => {
                    team.subscribers.remove(index);
                }
            }

            if team.captain.as_ref() == Some(departed) {
                team.captain = match promoted {
                    Some(promoted) => Some(promoted.clone()),
                    None => team.subscribers.first().cloned(),
                };
            }
            return;
        }
    }

    fn seat_on_smallest_team(&mut self, subscriber: &Subscriber) {
        if let Some(team) = self
            .teams
            .iter_mut()
            .min_by_key(|team| team.subscribers.len())
        {
            team.subscribers.push(subscriber.clone());
        }
    }
}
