//! Dependency Set
//!
//! A `Dep` is the subscriber registry attached to one observable slot, and to
//! each observed node as a whole. Reading a slot inside a tracked evaluation
//! adds an edge from the slot's dependency set to the active subscriber;
//! writing the slot notifies every registered subscriber.
//!
//! # How Notification Works
//!
//! 1. `notify()` prunes entries whose subscriber has been dropped.
//!
//! 2. The remaining subscribers are copied into a snapshot and the internal
//!    lock is released.
//!
//! 3. `update()` runs on each snapshot member, in the order it first
//!    subscribed.
//!
//! Because the pass iterates a snapshot, subscribers added or removed by a
//! running update are not observed until the next notify. No lock is held
//! while subscriber code runs, so an update may freely read and write other
//! slots, including the slot that is currently notifying.
//!
//! # Duplicate Edges
//!
//! `add_subscriber` appends unconditionally. Suppressing duplicate edges is
//! the subscriber's job (watchers keep a set of dependency IDs they already
//! registered with), which keeps the append path here trivial.
//!
//! # Lifetime
//!
//! Subscribers are held weakly. A live subscriber stays registered for as
//! long as it lives, even if a later evaluation stops reading the slot;
//! dropping every handle to the subscriber is the only way an edge goes away,
//! and dead edges are swept lazily at the next notify.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::trace;

use super::context::EvalContext;
use super::subscriber::Subscriber;

/// Counter for generating unique dependency set IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique dependency set ID.
fn next_dep_id() -> DepId {
    DepId(DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Unique identifier for a dependency set.
///
/// Subscribers key their duplicate-edge suppression on these IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The subscriber registry attached to one observable slot.
///
/// Cloning a `Dep` produces another handle to the same registry; slots hand
/// clones to subscribers so a subscriber can hold its dependencies without
/// keeping the owning node alive in any special way.
pub struct Dep {
    /// Unique identifier for this dependency set.
    id: DepId,

    /// Registered subscribers in first-subscription order.
    ///
    /// Most slots have zero or one watcher, so the list is inlined.
    subs: Arc<RwLock<SmallVec<[Weak<dyn Subscriber>; 2]>>>,
}

impl Dep {
    /// Create a new, empty dependency set.
    pub fn new() -> Self {
        Self {
            id: next_dep_id(),
            subs: Arc::new(RwLock::new(SmallVec::new())),
        }
    }

    /// Get the dependency set's unique ID.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Register a subscriber.
    ///
    /// Appends unconditionally; callers are responsible for not registering
    /// the same subscriber twice.
    pub fn add_subscriber(&self, subscriber: Weak<dyn Subscriber>) {
        self.subs.write().push(subscriber);
    }

    /// Wire an edge to the currently evaluating subscriber, if there is one.
    ///
    /// Called on every tracked read. The edge is routed through the
    /// subscriber's [`add_dep`](Subscriber::add_dep) so that repeated reads
    /// of the same slot during one evaluation collapse to a single edge.
    pub fn depend(&self) {
        if let Some(weak) = EvalContext::current() {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.add_dep(self);
            }
        }
    }

    /// Notify every registered subscriber that the value changed.
    ///
    /// Dead entries are pruned, the live list is snapshotted, and the lock
    /// is released before any subscriber runs. Subscribers fire in the order
    /// they first subscribed; subscribers added during the pass wait for the
    /// next notify.
    pub fn notify(&self) {
        let snapshot: Vec<Arc<dyn Subscriber>> = {
            let mut subs = self.subs.write();
            subs.retain(|weak| weak.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };

        if snapshot.is_empty() {
            return;
        }

        trace!(
            dep = self.id.raw(),
            subscribers = snapshot.len(),
            "notifying subscribers"
        );

        for subscriber in snapshot {
            subscriber.update();
        }
    }

    /// Number of live subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.subs
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Dep {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            subs: Arc::clone(&self.subs),
        }
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::SubscriberId;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Test double recording what the dependency set does to it.
    struct MockSubscriber {
        id: SubscriberId,
        updates: AtomicUsize,
        offered_deps: Mutex<Vec<DepId>>,
        on_update: Option<Box<dyn Fn() + Send + Sync>>,
    }

    impl MockSubscriber {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                updates: AtomicUsize::new(0),
                offered_deps: Mutex::new(Vec::new()),
                on_update: None,
            })
        }

        fn with_on_update<F>(f: F) -> Arc<Self>
        where
            F: Fn() + Send + Sync + 'static,
        {
            Arc::new(Self {
                id: SubscriberId::new(),
                updates: AtomicUsize::new(0),
                offered_deps: Mutex::new(Vec::new()),
                on_update: Some(Box::new(f)),
            })
        }

        fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }
    }

    impl Subscriber for MockSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, dep: &Dep) {
            self.offered_deps.lock().push(dep.id());
        }

        fn update(&self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if let Some(f) = &self.on_update {
                f();
            }
        }
    }

    #[test]
    fn dep_ids_are_unique() {
        let d1 = Dep::new();
        let d2 = Dep::new();
        let d3 = Dep::new();

        assert_ne!(d1.id(), d2.id());
        assert_ne!(d2.id(), d3.id());
        assert_ne!(d1.id(), d3.id());
    }

    #[test]
    fn notify_updates_registered_subscribers() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();
        dep.add_subscriber(Arc::downgrade(&sub) as Weak<dyn Subscriber>);

        assert_eq!(sub.update_count(), 0);

        dep.notify();
        assert_eq!(sub.update_count(), 1);

        dep.notify();
        assert_eq!(sub.update_count(), 2);
    }

    #[test]
    fn add_subscriber_appends_unconditionally() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();

        // Registering twice means firing twice; dedup is the caller's job.
        dep.add_subscriber(Arc::downgrade(&sub) as Weak<dyn Subscriber>);
        dep.add_subscriber(Arc::downgrade(&sub) as Weak<dyn Subscriber>);

        dep.notify();
        assert_eq!(sub.update_count(), 2);
    }

    #[test]
    fn notify_fires_in_subscription_order() {
        let dep = Dep::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let a = MockSubscriber::with_on_update(move || order_a.lock().push('a'));
        let order_b = Arc::clone(&order);
        let b = MockSubscriber::with_on_update(move || order_b.lock().push('b'));
        let order_c = Arc::clone(&order);
        let c = MockSubscriber::with_on_update(move || order_c.lock().push('c'));

        dep.add_subscriber(Arc::downgrade(&a) as Weak<dyn Subscriber>);
        dep.add_subscriber(Arc::downgrade(&b) as Weak<dyn Subscriber>);
        dep.add_subscriber(Arc::downgrade(&c) as Weak<dyn Subscriber>);

        dep.notify();
        assert_eq!(*order.lock(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn subscriber_added_mid_notify_waits_for_next_pass() {
        let dep = Dep::new();
        let late = MockSubscriber::new();

        let dep_clone = dep.clone();
        let late_clone = Arc::clone(&late);
        let first = MockSubscriber::with_on_update(move || {
            dep_clone.add_subscriber(Arc::downgrade(&late_clone) as Weak<dyn Subscriber>);
        });

        dep.add_subscriber(Arc::downgrade(&first) as Weak<dyn Subscriber>);

        // First pass runs only the snapshot taken at notify time.
        dep.notify();
        assert_eq!(first.update_count(), 1);
        assert_eq!(late.update_count(), 0);

        // The late subscriber is visible to the next pass.
        dep.notify();
        assert_eq!(late.update_count(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let dep = Dep::new();
        let keep = MockSubscriber::new();
        let drop_me = MockSubscriber::new();

        dep.add_subscriber(Arc::downgrade(&keep) as Weak<dyn Subscriber>);
        dep.add_subscriber(Arc::downgrade(&drop_me) as Weak<dyn Subscriber>);
        assert_eq!(dep.subscriber_count(), 2);

        drop(drop_me);
        assert_eq!(dep.subscriber_count(), 1);

        // Notify still reaches the live subscriber and sweeps the dead edge.
        dep.notify();
        assert_eq!(keep.update_count(), 1);
    }

    #[test]
    fn depend_routes_through_active_frame() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();

        // No active frame: nothing is offered.
        dep.depend();
        assert!(sub.offered_deps.lock().is_empty());

        let dyn_sub: Arc<dyn Subscriber> = Arc::clone(&sub) as Arc<dyn Subscriber>;
        {
            let _frame = EvalContext::enter(&dyn_sub);
            dep.depend();
            dep.depend();
        }

        // Every tracked read offers the dep; collapsing repeats is the
        // subscriber's choice.
        assert_eq!(*sub.offered_deps.lock(), vec![dep.id(), dep.id()]);
    }

    #[test]
    fn depend_is_inert_under_untracked_frame() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();

        let dyn_sub: Arc<dyn Subscriber> = Arc::clone(&sub) as Arc<dyn Subscriber>;
        let _frame = EvalContext::enter(&dyn_sub);

        EvalContext::untracked(|| dep.depend());
        assert!(sub.offered_deps.lock().is_empty());
    }

    #[test]
    fn clone_shares_registry() {
        let dep1 = Dep::new();
        let dep2 = dep1.clone();
        let sub = MockSubscriber::new();

        dep1.add_subscriber(Arc::downgrade(&sub) as Weak<dyn Subscriber>);
        assert_eq!(dep2.subscriber_count(), 1);

        dep2.notify();
        assert_eq!(sub.update_count(), 1);
    }
}
