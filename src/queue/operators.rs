//! Operator flag parsing for queue creation and updates
//!
//! Operators are free-text flags such as `-coop -host:ra3.se -game:q3,ql`.
//! Only a fixed allow-list of flags is recognised; anything else in the text
//! is ignored.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Flags the parser keeps, lowercased with their leading dash
pub const KNOWN_FLAGS: &[&str] = &[
    "-captains",
    "-captain",
    "-coop",
    "-nocoop",
    "-novoice",
    "-gamemode",
    "-gmode",
    "-rcon",
    "-norcon",
    "-host",
    "-port",
    "-game",
    "-teamsize",
];

fn flag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // flag, then optionally ':' and a comma separated list of values
        Regex::new(r"(-\w+)(?:\s*:\s*([^\s,\-][^\s,]*(?:\s*,\s*[^\s,]+)*))?")
            .expect("operator flag pattern is valid")
    })
}

/// Parsed operator flags; a flag given without a value maps to an empty list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorFlags {
    flags: BTreeMap<String, Vec<String>>,
}

impl OperatorFlags {
    /// Check whether a flag was given, with or without values
    pub fn contains(&self, flag: &str) -> bool {
        self.flags.contains_key(&flag.to_lowercase())
    }

    /// All values given for a flag, in the order they appeared
    pub fn values(&self, flag: &str) -> Option<&[String]> {
        self.flags.get(&flag.to_lowercase()).map(Vec::as_slice)
    }

    /// First value given for a flag
    pub fn first_value(&self, flag: &str) -> Option<&str> {
        self.values(flag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of whichever of the given flags appears first in the list
    pub fn first_of(&self, flags: &[&str]) -> Option<&str> {
        flags.iter().find_map(|flag| self.first_value(flag))
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.flags.iter()
    }

    fn push(&mut self, flag: String, values: Vec<String>) {
        self.flags.entry(flag).or_default().extend(values);
    }
}

/// Parse operator text into flags
///
/// Returns `None` when the text is blank or contains no recognised flag.
/// Repeated flags accumulate their values.
pub fn parse_operators(raw: &str) -> Option<OperatorFlags> {
    if raw.trim().is_empty() {
        return None;
    }

    let mut parsed = OperatorFlags::default();
    for captures in flag_pattern().captures_iter(raw) {
        let flag = captures[1].trim().to_lowercase();
        if !KNOWN_FLAGS.contains(&flag.as_str()) {
            continue;
        }

        let values = captures
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        parsed.push(flag, values);
    }

    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}
