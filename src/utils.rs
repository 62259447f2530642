//! Utility functions for the pickup service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique identifier for scheduled work
pub fn generate_task_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Storage key of a queue name: queue names are unique per guild ignoring case
pub fn queue_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Percentage of capacity filled, rounded up and capped at 100
pub fn readiness(subscriber_count: usize, capacity: usize) -> u8 {
    if capacity == 0 {
        return 0;
    }
    let filled = subscriber_count.min(capacity);
    ((filled * 100).div_ceil(capacity)) as u8
}

/// Clamp a requested team size into the supported range
pub fn clamp_team_size(requested: i64, max_team_size: usize) -> usize {
    requested.clamp(1, max_team_size.max(1) as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_task_id(), generate_task_id());
    }

    #[test]
    fn test_queue_key_ignores_case_and_padding() {
        assert_eq!(queue_key("  CTF "), "ctf");
        assert_eq!(queue_key("Duel"), queue_key("duel"));
    }

    #[test]
    fn test_readiness_rounds_up() {
        assert_eq!(readiness(0, 8), 0);
        assert_eq!(readiness(1, 8), 13);
        assert_eq!(readiness(1, 3), 34);
        assert_eq!(readiness(4, 8), 50);
        assert_eq!(readiness(8, 8), 100);
        assert_eq!(readiness(9, 8), 100);
        assert_eq!(readiness(3, 0), 0);
    }

    #[test]
    fn test_clamp_team_size() {
        assert_eq!(clamp_team_size(0, 16), 1);
        assert_eq!(clamp_team_size(-3, 16), 1);
        assert_eq!(clamp_team_size(5, 16), 5);
        assert_eq!(clamp_team_size(40, 16), 16);
    }
}
