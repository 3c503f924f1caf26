//! Subscriber types for the reactive system.
//!
//! A subscriber is any evaluation unit that reads observable slots and wants
//! to hear about changes. Watchers are the only subscriber this crate ships,
//! but dependency sets talk to subscribers exclusively through the
//! [`Subscriber`] trait, which keeps the wiring protocol independent of any
//! concrete watcher type.

use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. The ID is used for context
/// bookkeeping and diagnostics; duplicate-edge suppression is keyed by
/// dependency IDs on the subscriber side, not by subscriber IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A participant in dependency tracking.
///
/// The protocol has two halves. During a tracked evaluation, a slot read
/// hands its dependency set to the active subscriber via
/// [`add_dep`](Subscriber::add_dep), and the subscriber decides whether it is
/// already registered there. After a write, the dependency set calls
/// [`update`](Subscriber::update) on every registered subscriber.
pub trait Subscriber: Send + Sync {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Offer a dependency set encountered during evaluation.
    ///
    /// Implementations must register with `dep` at most once over their
    /// lifetime, no matter how many times the same slot is read.
    fn add_dep(&self, dep: &Dep);

    /// Re-evaluate after a dependency changed.
    fn update(&self);
}
