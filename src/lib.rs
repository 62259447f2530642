//! Pickup Room - pickup queue matchmaking for game communities
//!
//! Guild members gather in named queues; once a queue fills the players are
//! split into teams, voice channels are allocated and the rosters are
//! announced on the game server over the Quake 3 style RCON protocol.

pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod queue;
pub mod rcon;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{PickupError, Result};
pub use types::*;

// Re-export key components
pub use commands::{CommandHandler, CommandReply, PickupCommand};
pub use platform::{ChatPlatform, ModerationCheck};
pub use queue::{PickupQueue, QueueManager};
pub use rcon::{GameServerLink, ServerControl};
pub use store::{InMemoryQueueStore, QueueStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
