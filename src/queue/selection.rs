//! Readiness ordering and default queue selection
//!
//! Queues closest to full are surfaced first; among equally ready queues the
//! one created first wins.

use crate::queue::instance::PickupQueue;
use std::cmp::Ordering;

/// Ordering used for list displays and default selection
pub fn compare_by_readiness(a: &PickupQueue, b: &PickupQueue) -> Ordering {
    b.readiness()
        .cmp(&a.readiness())
        .then(a.created_at().cmp(&b.created_at()))
}

/// Sort queues in place, most ready first
pub fn order_by_readiness(queues: &mut [PickupQueue]) {
    queues.sort_by(compare_by_readiness);
}

/// Pick the queue an `add` without a name should join
///
/// The most ready queue that still has a spot is preferred; when every queue
/// is full the first one in readiness order is returned so the user lands on
/// its waiting list.
pub fn select_default_queue(queues: &[PickupQueue]) -> Option<&PickupQueue> {
    let mut ordered: Vec<&PickupQueue> = queues.iter().collect();
    ordered.sort_by(|a, b| compare_by_readiness(a, b));

    ordered
        .iter()
        .find(|queue| !queue.is_full())
        .or_else(|| ordered.first())
        .copied()
}
