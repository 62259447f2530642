//! Common types used throughout the pickup service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Chat platform identifier of a guild (community)
pub type GuildId = u64;

/// Chat platform identifier of a user
pub type UserId = u64;

/// Chat platform identifier of a rendered message
pub type MessageId = u64;

/// Chat platform identifier of a voice channel
pub type ChannelId = u64;

/// A user holding a spot in a queue or on its waiting list
///
/// Two subscribers are equal when they share an id; the display name is
/// whatever the platform reported when the user joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: UserId,
    pub name: String,
}

impl Subscriber {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Which side of a started queue a team plays on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamSide {
    Red,
    Blue,
    Coop,
}

impl TeamSide {
    /// Display name of the team
    pub fn team_name(&self) -> &'static str {
        match self {
            TeamSide::Red => "Red Team",
            TeamSide::Blue => "Blue Team",
            TeamSide::Coop => "Coop Team",
        }
    }

    /// Emblem appended to the queue name for the team's voice channel
    pub fn emblem(&self) -> &'static str {
        match self {
            TeamSide::Red => "🔴",
            TeamSide::Blue => "🔵",
            TeamSide::Coop => "🟢",
        }
    }
}

impl std::fmt::Display for TeamSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.team_name())
    }
}

/// Voice channel bound to a team; the handle is filled in once allocated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub name: String,
    pub channel_id: Option<ChannelId>,
}

/// A group of subscribers playing together once a queue has started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub side: TeamSide,
    pub name: String,
    pub subscribers: Vec<Subscriber>,
    pub captain: Option<Subscriber>,
    pub voice_channel: Option<VoiceChannel>,
}

impl Team {
    pub fn new(side: TeamSide, subscribers: Vec<Subscriber>) -> Self {
        Self {
            side,
            name: side.team_name().to_string(),
            subscribers,
            captain: None,
            voice_channel: None,
        }
    }

    /// Check whether the user plays on this team
    pub fn contains(&self, user_id: UserId) -> bool {
        self.subscribers.iter().any(|s| s.id == user_id)
    }
}

/// Reaction translated by the platform adapter into a queue action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionKind {
    Join,
    Leave,
}

/// Who is asking for a privileged operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub subscriber: Subscriber,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(subscriber: Subscriber) -> Self {
        Self {
            subscriber,
            is_admin: false,
        }
    }

    pub fn admin(subscriber: Subscriber) -> Self {
        Self {
            subscriber,
            is_admin: true,
        }
    }

    pub fn id(&self) -> UserId {
        self.subscriber.id
    }
}

/// Outbound notices handed to the chat platform for rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PickupEvent {
    QueueCreated {
        queue_name: String,
        owner: Subscriber,
    },
    PlayerJoined {
        queue_name: String,
        subscriber: Subscriber,
        readiness: u8,
    },
    PlayerWaitListed {
        queue_name: String,
        subscriber: Subscriber,
        position: usize,
    },
    PlayerLeft {
        queue_name: String,
        subscriber: Subscriber,
        promoted: Option<Subscriber>,
    },
    WaitListPromoted {
        queue_name: String,
        subscriber: Subscriber,
    },
    QueueFull {
        queue_name: String,
        subscribers: Vec<Subscriber>,
    },
    QueueRemoved {
        queue_name: String,
    },
    QueueRenamed {
        old_name: String,
        new_name: String,
    },
    QueueUpdated {
        queue_name: String,
    },
    UserCleared {
        subscriber: Subscriber,
        queues: Vec<String>,
    },
    TeamsReady {
        queue_name: String,
        teams: Vec<Team>,
    },
    QueueStopped {
        queue_name: String,
    },
    QueuePromoted {
        queue_name: String,
        missing_players: usize,
    },
}

impl PickupEvent {
    /// Short event type name, used in logs and tests
    pub fn kind(&self) -> &'static str {
        match self {
            PickupEvent::QueueCreated { .. } => "QueueCreated",
            PickupEvent::PlayerJoined { .. } => "PlayerJoined",
            PickupEvent::PlayerWaitListed { .. } => "PlayerWaitListed",
            PickupEvent::PlayerLeft { .. } => "PlayerLeft",
            PickupEvent::WaitListPromoted { .. } => "WaitListPromoted",
            PickupEvent::QueueFull { .. } => "QueueFull",
            PickupEvent::QueueRemoved { .. } => "QueueRemoved",
            PickupEvent::QueueRenamed { .. } => "QueueRenamed",
            PickupEvent::QueueUpdated { .. } => "QueueUpdated",
            PickupEvent::UserCleared { .. } => "UserCleared",
            PickupEvent::TeamsReady { .. } => "TeamsReady",
            PickupEvent::QueueStopped { .. } => "QueueStopped",
            PickupEvent::QueuePromoted { .. } => "QueuePromoted",
        }
    }
}

/// Roster snapshot taken when a queue starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub guild_id: GuildId,
    pub queue_name: String,
    pub host: String,
    pub port: u16,
    pub teams: Vec<Team>,
    pub taken_at: DateTime<Utc>,
}
