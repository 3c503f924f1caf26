//! Evaluation Context
//!
//! The evaluation context tracks which subscriber is currently evaluating.
//! This enables automatic dependency wiring: when an observable slot is read,
//! the slot's dependency set can register the current subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. When a watcher evaluates, it pushes
//! a tracking frame holding a weak handle to itself; when the evaluation
//! completes, the frame pops. The pop lives in a guard's `Drop` impl, so a
//! panicking evaluation still restores the stack before the panic reaches
//! caller code.
//!
//! The stack shape (rather than a single pointer) supports nested synchronous
//! evaluation: a write inside a subscriber callback can trigger another
//! evaluation while an outer one is still on the call stack. An `Untracked`
//! frame masks any outer tracking frame, which is how snapshot export and
//! other deliberate non-reactive reads stay invisible to dependency
//! collection.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use super::subscriber::{Subscriber, SubscriberId};

/// The evaluation frame stack.
///
/// Each thread has its own stack to track which subscriber is evaluating.
/// This thread-local approach avoids the need for synchronization in the
/// common case of single-threaded reactivity.
thread_local! {
    static FRAME_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// An entry on the evaluation frame stack.
enum Frame {
    /// A subscriber is evaluating; slot reads register with it.
    Tracking {
        subscriber_id: SubscriberId,
        subscriber: Weak<dyn Subscriber>,
    },
    /// Slot reads wire nothing, even if an outer tracking frame exists.
    Untracked,
}

/// Guard that pops its frame when dropped.
///
/// This keeps the frame stack consistent even if the evaluation panics,
/// so the tracker is never left pointing at a dead subscriber.
pub struct EvalContext {
    subscriber_id: Option<SubscriberId>,
}

impl EvalContext {
    /// Enter a tracking frame for the given subscriber.
    ///
    /// While this frame is topmost, any observable slot that is read will
    /// register the subscriber as a dependent.
    ///
    /// The frame is popped when the returned guard is dropped.
    pub fn enter(subscriber: &Arc<dyn Subscriber>) -> Self {
        let subscriber_id = subscriber.id();
        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Tracking {
                subscriber_id,
                subscriber: Arc::downgrade(subscriber),
            });
        });

        Self {
            subscriber_id: Some(subscriber_id),
        }
    }

    /// Enter an untracked frame.
    ///
    /// While this frame is topmost, slot reads wire no dependencies.
    pub fn enter_untracked() -> Self {
        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Untracked);
        });

        Self {
            subscriber_id: None,
        }
    }

    /// Run `f` with dependency collection suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _frame = Self::enter_untracked();
        f()
    }

    /// Check whether the topmost frame is a tracking frame.
    pub fn is_active() -> bool {
        FRAME_STACK.with(|stack| matches!(stack.borrow().last(), Some(Frame::Tracking { .. })))
    }

    /// Get the currently evaluating subscriber, if any.
    ///
    /// Returns `None` when the stack is empty or the topmost frame is
    /// untracked.
    pub fn current() -> Option<Weak<dyn Subscriber>> {
        FRAME_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { subscriber, .. }) => Some(subscriber.clone()),
            _ => None,
        })
    }

    /// Get the ID of the currently evaluating subscriber, if any.
    pub fn current_id() -> Option<SubscriberId> {
        FRAME_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { subscriber_id, .. }) => Some(*subscriber_id),
            _ => None,
        })
    }

    /// Current depth of the frame stack (tracking and untracked frames).
    pub fn depth() -> usize {
        FRAME_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EvalContext {
    fn drop(&mut self) {
        FRAME_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right frame.
            // This helps catch bugs where guards are dropped out of order.
            match popped {
                Some(Frame::Tracking { subscriber_id, .. }) => {
                    debug_assert_eq!(
                        Some(subscriber_id),
                        self.subscriber_id,
                        "EvalContext mismatch: expected {:?}, got {:?}",
                        self.subscriber_id,
                        subscriber_id
                    );
                }
                Some(Frame::Untracked) => {
                    debug_assert!(
                        self.subscriber_id.is_none(),
                        "EvalContext mismatch: expected {:?}, got an untracked frame",
                        self.subscriber_id
                    );
                }
                None => {
                    debug_assert!(false, "EvalContext dropped with an empty frame stack");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::dep::Dep;

    struct NullSubscriber {
        id: SubscriberId,
    }

    impl NullSubscriber {
        fn new() -> Arc<dyn Subscriber> {
            Arc::new(Self {
                id: SubscriberId::new(),
            })
        }
    }

    impl Subscriber for NullSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, _dep: &Dep) {}

        fn update(&self) {}
    }

    #[test]
    fn context_tracks_subscriber() {
        let subscriber = NullSubscriber::new();
        let id = subscriber.id();

        assert!(!EvalContext::is_active());
        assert!(EvalContext::current_id().is_none());

        {
            let _ctx = EvalContext::enter(&subscriber);

            assert!(EvalContext::is_active());
            assert_eq!(EvalContext::current_id(), Some(id));
        }

        // Frame should be cleaned up after drop.
        assert!(!EvalContext::is_active());
        assert!(EvalContext::current_id().is_none());
    }

    #[test]
    fn current_resolves_to_live_subscriber() {
        let subscriber = NullSubscriber::new();
        let _ctx = EvalContext::enter(&subscriber);

        let weak = EvalContext::current().expect("tracking frame should be active");
        let resolved = weak.upgrade().expect("subscriber should still be alive");
        assert_eq!(resolved.id(), subscriber.id());
    }

    #[test]
    fn nested_frames() {
        let outer = NullSubscriber::new();
        let inner = NullSubscriber::new();

        {
            let _outer_ctx = EvalContext::enter(&outer);
            assert_eq!(EvalContext::current_id(), Some(outer.id()));

            {
                let _inner_ctx = EvalContext::enter(&inner);
                assert_eq!(EvalContext::current_id(), Some(inner.id()));
                assert_eq!(EvalContext::depth(), 2);
            }

            // After the inner frame drops, the outer one is current again.
            assert_eq!(EvalContext::current_id(), Some(outer.id()));
        }

        assert!(EvalContext::current_id().is_none());
        assert_eq!(EvalContext::depth(), 0);
    }

    #[test]
    fn untracked_masks_outer_tracking_frame() {
        let subscriber = NullSubscriber::new();
        let _ctx = EvalContext::enter(&subscriber);
        assert!(EvalContext::is_active());

        EvalContext::untracked(|| {
            assert!(!EvalContext::is_active());
            assert!(EvalContext::current().is_none());
            assert!(EvalContext::current_id().is_none());
        });

        // Tracking resumes once the untracked frame pops.
        assert!(EvalContext::is_active());
        assert_eq!(EvalContext::current_id(), Some(subscriber.id()));
    }

    #[test]
    fn frame_pops_during_panic_unwind() {
        let subscriber = NullSubscriber::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = EvalContext::enter(&subscriber);
            panic!("evaluation failed");
        }));

        assert!(result.is_err());
        assert!(!EvalContext::is_active());
        assert_eq!(EvalContext::depth(), 0);
    }
}
