//! Team formation

use crate::types::{Subscriber, Team, TeamSide};
use rand::seq::SliceRandom;
use rand::Rng;

/// Split subscribers into teams after a uniform shuffle
///
/// Coop queues get a single team. Otherwise the first `ceil(n / 2)` shuffled
/// players form the red team and the rest the blue team, which may be empty.
/// In captain mode each team's first player is its captain.
pub fn form_teams<R: Rng + ?Sized>(
    subscribers: &[Subscriber],
    coop: bool,
    captain_mode: bool,
    rng: &mut R,
) -> Vec<Team> {
    let mut shuffled = subscribers.to_vec();
    shuffled.shuffle(rng);

    let mut teams = if coop {
        vec![Team::new(TeamSide::Coop, shuffled)]
    } else {
        let half = shuffled.len().div_ceil(2);
        let blue = shuffled.split_off(half);
        vec![
            Team::new(TeamSide::Red, shuffled),
            Team::new(TeamSide::Blue, blue),
        ]
    };

    if captain_mode {
        for team in teams.iter_mut() {
            team.captain = team.subscribers.first().cloned();
        }
    }

    teams
}

/// Voice channel name for a team of a queue
pub fn voice_channel_name(queue_name: &str, side: TeamSide) -> String {
    format!("{} {}", queue_name, side.emblem())
}
