//! Pickup queues
//!
//! The queue entity and its pure transitions live in [`instance`]; the
//! [`manager`] runs them against the store, the chat platform and the
//! session controller.

pub mod instance;
pub mod locks;
pub mod manager;
pub mod operators;
pub mod selection;

pub use instance::{LeaveOutcome, Membership, PickupQueue, SubscribeOutcome};
pub use locks::{QueueGuard, QueueLocks};
pub use manager::{AddResult, LeaveResult, QueueManager, QueueManagerStats};
pub use operators::{parse_operators, OperatorFlags, KNOWN_FLAGS};
pub use selection::{compare_by_readiness, order_by_readiness, select_default_queue};
