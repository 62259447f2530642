//! Property tests for queue transitions and team formation

use pickup_room::queue::{LeaveOutcome, PickupQueue, SubscribeOutcome};
use pickup_room::session::teams::form_teams;
use pickup_room::types::Subscriber;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Leave(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..30).prop_map(Op::Add),
        1 => (1u64..30).prop_map(Op::Leave),
    ]
}

fn player(id: u64) -> Subscriber {
    Subscriber::new(id, format!("p{}", id))
}

fn empty_queue(team_size: usize) -> PickupQueue {
    PickupQueue::new(1, "prop", &player(0), team_size)
}

fn apply(queue: &PickupQueue, op: &Op) -> PickupQueue {
    match op {
        Op::Add(id) => queue.subscribe(player(*id)).0,
        Op::Leave(id) => queue.leave(*id).0,
    }
}

proptest! {
    #[test]
    fn subscribers_never_exceed_capacity(
        team_size in 1usize..6,
        ops in prop::collection::vec(op(), 0..80),
    ) {
        let mut queue = empty_queue(team_size);
        for op in &ops {
            queue = apply(&queue, op);

            prop_assert!(queue.subscribers().len() <= queue.max_in_queue());
            prop_assert!(queue.readiness() <= 100);
            // Nobody waits while a spot is open
            if !queue.wait_list().is_empty() {
                prop_assert!(queue.is_full());
            }

            let ids: Vec<u64> = queue
                .subscribers()
                .iter()
                .chain(queue.wait_list().iter())
                .map(|s| s.id)
                .collect();
            let unique: HashSet<u64> = ids.iter().copied().collect();
            prop_assert_eq!(ids.len(), unique.len());
        }
    }

    #[test]
    fn readiness_grows_with_each_subscriber(team_size in 1usize..8) {
        let mut queue = empty_queue(team_size);
        let mut last = queue.readiness();
        prop_assert_eq!(last, 0);

        for id in 1..=(team_size as u64 * 2) {
            queue = queue.subscribe(player(id)).0;
            prop_assert!(queue.readiness() > last);
            last = queue.readiness();
        }
        prop_assert_eq!(last, 100);
    }

    #[test]
    fn readiness_never_grows_when_players_leave(
        team_size in 1usize..6,
        joined in 0u64..16,
        order in prop::collection::vec(1u64..20, 0..20),
    ) {
        let mut queue = empty_queue(team_size);
        for id in 1..=joined {
            queue = queue.subscribe(player(id)).0;
        }

        let mut last = queue.readiness();
        for id in order {
            queue = queue.leave(id).0;
            prop_assert!(queue.readiness() <= last);
            prop_assert!(queue.readiness() <= 100);
            last = queue.readiness();
        }
    }

    #[test]
    fn repeated_add_and_leave_are_idempotent(
        team_size in 1usize..4,
        prefill in 0u64..10,
        id in 100u64..110,
    ) {
        let mut queue = empty_queue(team_size);
        for other in 1..=prefill {
            queue = queue.subscribe(player(other)).0;
        }

        let (once, first) = queue.subscribe(player(id));
        let (twice, second) = once.subscribe(player(id));
        prop_assert!(first.changed());
        prop_assert!(!second.changed());
        prop_assert_eq!(once.subscribers(), twice.subscribers());
        prop_assert_eq!(once.wait_list(), twice.wait_list());

        // Leaving again restores the queue as it was before the add
        let (gone, _) = twice.leave(id);
        prop_assert_eq!(gone.subscribers(), queue.subscribers());
        prop_assert_eq!(gone.wait_list(), queue.wait_list());
        prop_assert_eq!(gone.readiness(), queue.readiness());

        let (still_gone, outcome) = gone.leave(id);
        prop_assert_eq!(outcome, LeaveOutcome::NotMember);
        prop_assert_eq!(gone.subscribers(), still_gone.subscribers());
        prop_assert!(still_gone.membership(id).is_none());
    }

    #[test]
    fn wait_list_is_promoted_in_arrival_order(
        team_size in 1usize..4,
        waiting in 1u64..8,
    ) {
        let capacity = team_size as u64 * 2;
        let mut queue = empty_queue(team_size);
        for id in 1..=(capacity + waiting) {
            let (next, outcome) = queue.subscribe(player(id));
            if id > capacity {
                prop_assert_eq!(
                    outcome,
                    SubscribeOutcome::WaitListed { position: (id - capacity) as usize }
                );
            }
            queue = next;
        }

        // Every subscriber leaving frees one spot for the next in line
        let mut promoted = Vec::new();
        for id in 1..=capacity.min(waiting) {
            let (next, outcome) = queue.leave(id);
            if let LeaveOutcome::Left { promoted: Some(p), .. } = outcome {
                promoted.push(p.id);
            }
            queue = next;
        }

        let expected: Vec<u64> = (capacity + 1..=capacity + capacity.min(waiting)).collect();
        prop_assert_eq!(promoted, expected);
    }

    #[test]
    fn teams_partition_the_subscribers(
        count in 0u64..16,
        coop in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let subscribers: Vec<Subscriber> = (1..=count).map(player).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let teams = form_teams(&subscribers, coop, false, &mut rng);

        prop_assert_eq!(teams.len(), if coop { 1 } else { 2 });
        let placed: Vec<u64> = teams
            .iter()
            .flat_map(|t| t.subscribers.iter().map(|s| s.id))
            .collect();
        let unique: HashSet<u64> = placed.iter().copied().collect();
        prop_assert_eq!(placed.len(), subscribers.len());
        prop_assert_eq!(unique.len(), subscribers.len());

        if !coop {
            let red = teams[0].subscribers.len();
            let blue = teams[1].subscribers.len();
            prop_assert!(red == blue || red == blue + 1);
        }
    }
}
