//! Text command parsing
//!
//! Commands look like `create "Friday CTF" 4 -coop -host:ra3.se`. Queue names
//! with spaces are written in double quotes; an optional `!` prefix is
//! accepted.

use crate::error::PickupError;

/// A parsed pickup command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickupCommand {
    Create {
        name: String,
        team_size: Option<i64>,
        operators: String,
    },
    Rename {
        old_name: String,
        new_name: String,
    },
    Update {
        name: String,
        team_size: Option<i64>,
        operators: String,
    },
    Delete {
        name: String,
    },
    List,
    WaitList {
        name: String,
    },
    Promote {
        name: Option<String>,
    },
    Start {
        name: String,
    },
    Teams {
        name: String,
    },
    Stop {
        name: String,
    },
    Add {
        name: Option<String>,
    },
    Remove {
        name: String,
    },
    Clear,
    Subscribe,
    Status {
        name: String,
    },
    Player {
        name: String,
        player: String,
    },
}

impl PickupCommand {
    /// Command word, used as a metrics label
    pub fn name(&self) -> &'static str {
        match self {
            PickupCommand::Create { .. } => "create",
            PickupCommand::Rename { .. } => "rename",
            PickupCommand::Update { .. } => "update",
            PickupCommand::Delete { .. } => "delete",
            PickupCommand::List => "list",
            PickupCommand::WaitList { .. } => "waitlist",
            PickupCommand::Promote { .. } => "promote",
            PickupCommand::Start { .. } => "start",
            PickupCommand::Teams { .. } => "teams",
            PickupCommand::Stop { .. } => "stop",
            PickupCommand::Add { .. } => "add",
            PickupCommand::Remove { .. } => "remove",
            PickupCommand::Clear => "clear",
            PickupCommand::Subscribe => "subscribe",
            PickupCommand::Status { .. } => "status",
            PickupCommand::Player { .. } => "player",
        }
    }
}

/// Split a line into words, keeping double-quoted runs together
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

fn invalid(reason: impl Into<String>) -> PickupError {
    PickupError::InvalidRequest {
        reason: reason.into(),
    }
}

fn required(tokens: &[String], index: usize, what: &str) -> Result<String, PickupError> {
    tokens
        .get(index)
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .ok_or_else(|| invalid(format!("missing {}", what)))
}

/// Name, optional team size and operator text of `create` and `update`
fn queue_settings(tokens: &[String]) -> Result<(String, Option<i64>, String), PickupError> {
    let name = required(tokens, 1, "queue name")?;
    let mut rest = &tokens[2.min(tokens.len())..];

    let team_size = match rest.first().map(|t| t.parse::<i64>()) {
        Some(Ok(size)) => {
            rest = &rest[1..];
            Some(size)
        }
        _ => None,
    };

    Ok((name, team_size, rest.join(" ")))
}

/// Parse one command line
pub fn parse_command(line: &str) -> Result<PickupCommand, PickupError> {
    let line = line.trim();
    let line = line.strip_prefix('!').unwrap_or(line);
    let tokens = tokenize(line);
    let Some(word) = tokens.first() else {
        return Err(invalid("empty command"));
    };
    let optional = |index: usize| tokens.get(index).filter(|t| !t.trim().is_empty()).cloned();

    let command = match word.to_lowercase().as_str() {
        "create" => {
            let (name, team_size, operators) = queue_settings(&tokens)?;
            PickupCommand::Create {
                name,
                team_size,
                operators,
            }
        }
        "update" => {
            let (name, team_size, operators) = queue_settings(&tokens)?;
            PickupCommand::Update {
                name,
                team_size,
                operators,
            }
        }
        "rename" => PickupCommand::Rename {
            old_name: required(&tokens, 1, "queue name")?,
            new_name: required(&tokens, 2, "new queue name")?,
        },
        "delete" => PickupCommand::Delete {
            name: required(&tokens, 1, "queue name")?,
        },
        "list" => PickupCommand::List,
        "waitlist" => PickupCommand::WaitList {
            name: required(&tokens, 1, "queue name")?,
        },
        "promote" => PickupCommand::Promote { name: optional(1) },
        "start" => PickupCommand::Start {
            name: required(&tokens, 1, "queue name")?,
        },
        "teams" => PickupCommand::Teams {
            name: required(&tokens, 1, "queue name")?,
        },
        "stop" => PickupCommand::Stop {
            name: required(&tokens, 1, "queue name")?,
        },
        "add" => PickupCommand::Add { name: optional(1) },
        "remove" => PickupCommand::Remove {
            name: required(&tokens, 1, "queue name")?,
        },
        "clear" => PickupCommand::Clear,
        "subscribe" => PickupCommand::Subscribe,
        "status" => PickupCommand::Status {
            name: required(&tokens, 1, "queue name")?,
        },
        "player" => PickupCommand::Player {
            name: required(&tokens, 1, "queue name")?,
            player: required(&tokens, 2, "player name")?,
        },
        other => return Err(invalid(format!("unknown command '{}'", other))),
    };

    Ok(command)
}
