//! Game sessions: team formation and the started/stopped state of a queue

pub mod controller;
pub mod teams;

pub use controller::{roster_snapshot, SessionController};
pub use teams::{form_teams, voice_channel_name};
