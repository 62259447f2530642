//! Text command surface of the pickup service

pub mod handler;
pub mod parser;

pub use handler::{CommandHandler, CommandReply};
pub use parser::{parse_command, tokenize, PickupCommand};
