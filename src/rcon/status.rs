//! Parsing of `status` and `dumpuser` replies
//!
//! Both parsers are lenient: lines they do not understand are skipped, so a
//! garbled reply yields a partial result instead of an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One row of the player table in a `status` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayer {
    pub client_id: u32,
    pub score: i32,
    pub ping: u32,
    /// Name as the server prints it, color codes included
    pub name: String,
    pub clean_name: String,
    pub address: String,
    pub rate: u32,
}

/// Parsed `status` reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub map: Option<String>,
    pub players: Vec<StatusPlayer>,
}

/// Parsed `dumpuser` reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub clean_name: Option<String>,
    pub rate: Option<String>,
    pub snaps: Option<String>,
    pub handicap: Option<String>,
    pub cl_time_nudge: Option<String>,
    pub discord_id: Option<String>,
    pub cl_guid: Option<String>,
}

impl ClientInfo {
    /// Nothing was recognised in the reply
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.rate.is_none()
            && self.snaps.is_none()
            && self.handicap.is_none()
            && self.cl_time_nudge.is_none()
            && self.discord_id.is_none()
            && self.cl_guid.is_none()
    }
}

fn color_code_regex() -> &'static Regex {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    COLOR.get_or_init(|| Regex::new(r"\^.").expect("color code pattern is valid"))
}

fn player_row_regex() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    // Some mods print an extra numeric column between the id and the score.
    // Stock servers put lastmsg before the address and qport after it.
    ROW.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?P<id>\d+)\s+(?:\d+\s+)?(?P<score>-?\d+)\s+(?P<ping>\d+)\s+",
            r"(?P<name>.+?)\s+(?:\d+\s+)?",
            r"(?P<address>(?:\^.)?(?:\d{1,3}(?:\.\d{1,3}){3}(?::\d+)?|loopback|bot))",
            r"\s+(?:\d+\s+)?(?P<rate>\d+)\s*$",
        ))
        .expect("status row pattern is valid")
    })
}

/// Remove two-character color escapes such as `^3`
pub fn strip_color_codes(text: &str) -> String {
    color_code_regex().replace_all(text, "").into_owned()
}

fn is_sentinel(line: &str) -> bool {
    line.starts_with('\0')
        || line.starts_with("????")
        || line.starts_with("cl ")
        || line.starts_with("-- ")
        || line.starts_with("---")
}

/// Parse a `status` reply into the map name and player rows
pub fn parse_status(response: &str) -> ServerStatus {
    let mut status = ServerStatus::default();

    for line in response.lines() {
        if is_sentinel(line) {
            continue;
        }
        if let Some(map) = line.strip_prefix("map: ") {
            status.map = Some(map.trim().to_string());
            continue;
        }
        if let Some(player) = parse_player_row(line) {
            status.players.push(player);
        }
    }

    status
}

fn parse_player_row(line: &str) -> Option<StatusPlayer> {
    let captures = player_row_regex().captures(line)?;
    let name = captures.name("name")?.as_str().trim().to_string();

    Some(StatusPlayer {
        client_id: captures.name("id")?.as_str().parse().ok()?,
        score: captures.name("score")?.as_str().parse().ok()?,
        ping: captures.name("ping")?.as_str().parse().ok()?,
        clean_name: strip_color_codes(&name),
        name,
        address: strip_color_codes(captures.name("address")?.as_str()),
        rate: captures.name("rate")?.as_str().parse().ok()?,
    })
}

/// Parse a `dumpuser` reply; a repeated key keeps its last value
pub fn parse_client_info(response: &str) -> ClientInfo {
    let mut info = ClientInfo::default();

    for line in response.lines() {
        let line = line.trim_start();
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim().to_string()),
            None => continue,
        };

        match key {
            "name" => {
                info.clean_name = Some(strip_color_codes(&value));
                info.name = Some(value);
            }
            "rate" => info.rate = Some(value),
            "snaps" => info.snaps = Some(value),
            "handicap" => info.handicap = Some(value),
            "cl_timeNudge" => info.cl_time_nudge = Some(value),
            "DiscordId" => info.discord_id = Some(value),
            "cl_guid" => info.cl_guid = Some(value),
            _ => {}
        }
    }

    info
}
