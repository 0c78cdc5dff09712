//! Observer types for the visit stream.
//!
//! An observer is a callback attached to one node that receives every visit
//! event the node goes through: Enter/Leave of updates and LoopSearch
//! probes. Observers run after the event, with the graph free to read.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observer.
///
/// Returned by [`Node::observe`](crate::Node::observe) and used to detach the
/// observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
