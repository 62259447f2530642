//! Who is acting
//!
//! Commands can come from guild members, from users seen outside a guild, or
//! from the bot itself. Callers pick the matching implementation and the rest
//! of the crate only sees the [`Actor`] capability.

use crate::types::{Requester, Subscriber, UserId};

/// Name and mention capability of anything that can issue a command
pub trait Actor: Send + Sync {
    fn id(&self) -> UserId;

    /// Name shown in rosters and notices
    fn display_name(&self) -> String;

    /// Token that pings the actor in a chat message
    fn mention_token(&self) -> String {
        format!("<@{}>", self.id())
    }

    /// Whether the actor holds guild administrator rights
    fn is_admin(&self) -> bool {
        false
    }
}

/// A member of the guild the command was issued in
#[derive(Debug, Clone)]
pub struct GuildMember {
    pub id: UserId,
    pub username: String,
    pub nickname: Option<String>,
    pub administrator: bool,
}

impl Actor for GuildMember {
    fn id(&self) -> UserId {
        self.id
    }

    fn display_name(&self) -> String {
        self.nickname
            .as_deref()
            .filter(|nick| !nick.trim().is_empty())
            .unwrap_or(&self.username)
            .to_string()
    }

    fn mention_token(&self) -> String {
        format!("<@!{}>", self.id)
    }

    fn is_admin(&self) -> bool {
        self.administrator
    }
}

/// A user known only by their global account
#[derive(Debug, Clone)]
pub struct PlatformUser {
    pub id: UserId,
    pub username: String,
}

impl Actor for PlatformUser {
    fn id(&self) -> UserId {
        self.id
    }

    fn display_name(&self) -> String {
        self.username.clone()
    }
}

/// The service's own account
#[derive(Debug, Clone)]
pub struct BotSelf {
    pub id: UserId,
    pub name: String,
}

impl Actor for BotSelf {
    fn id(&self) -> UserId {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn mention_token(&self) -> String {
        self.name.clone()
    }

    fn is_admin(&self) -> bool {
        true
    }
}

impl Subscriber {
    pub fn from_actor(actor: &dyn Actor) -> Self {
        Subscriber::new(actor.id(), actor.display_name())
    }
}

impl Requester {
    pub fn from_actor(actor: &dyn Actor) -> Self {
        Requester {
            subscriber: Subscriber::from_actor(actor),
            is_admin: actor.is_admin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guild_member_prefers_nickname() {
        let member = GuildMember {
            id: 10,
            username: "rocket".to_string(),
            nickname: Some("Rocket Jumper".to_string()),
            administrator: false,
        };
        assert_eq!(member.display_name(), "Rocket Jumper");
        assert_eq!(member.mention_token(), "<@!10>");

        let blank = GuildMember {
            nickname: Some("  ".to_string()),
            ..member
        };
        assert_eq!(blank.display_name(), "rocket");
    }

    #[test]
    fn test_requester_from_actor() {
        let admin = GuildMember {
            id: 3,
            username: "mod".to_string(),
            nickname: None,
            administrator: true,
        };
        let requester = Requester::from_actor(&admin);
        assert!(requester.is_admin);
        assert_eq!(requester.subscriber, Subscriber::new(3, "mod"));

        let user = PlatformUser {
            id: 4,
            username: "guest".to_string(),
        };
        assert!(!Requester::from_actor(&user).is_admin);
        assert_eq!(user.mention_token(), "<@4>");
    }

    #[test]
    fn test_bot_self() {
        let bot = BotSelf {
            id: 1,
            name: "PickupBot".to_string(),
        };
        assert_eq!(bot.mention_token(), "PickupBot");
        assert!(bot.is_admin());
    }
}
