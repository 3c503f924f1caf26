//! Reactivity Core
//!
//! This module implements the dependency-tracking object model: observed
//! nodes, dependency sets, and watchers.
//!
//! # Concepts
//!
//! ## Observed nodes
//!
//! An observed node instruments one plain object or array: every own
//! property becomes a reactive slot backed by a dependency set, recursively
//! for nested containers. Reads and writes go through the slot, which is
//! what makes mutation observable.
//!
//! ## Dependency sets
//!
//! A dependency set is the subscriber registry attached to one slot (and to
//! each node as a whole). Writing a slot notifies its set; each registered
//! watcher re-evaluates and fires its callback if the value changed.
//!
//! ## Watchers
//!
//! A watcher is one live binding: an expression evaluated against the data
//! root plus a `(new, old)` callback. Evaluating under a tracking frame is
//! what wires the edges: a slot read during evaluation registers the
//! active watcher automatically.
//!
//! # Implementation Notes
//!
//! Tracking state is a thread-local stack of evaluation frames with RAII
//! release, so nested synchronous evaluation (a write inside a callback
//! triggering another notify) is a plain call stack and a panicking getter
//! cannot leave the tracker pointing at a dead subscriber.
//!
//! Everything is synchronous: a write returns only after every affected
//! watcher has re-evaluated and fired. There is no batching; N writes mean
//! N callbacks.

mod context;
mod dep;
mod observe;
mod path;
mod subscriber;
mod value;
mod watcher;

pub use context::EvalContext;
pub use dep::{Dep, DepId};
pub use observe::{observe, observe_json, ComputedGetter, ComputedSetter, NodeKind, ObservedNode};
pub use path::{parse_path, PathAccessor, PathError};
pub use subscriber::{Subscriber, SubscriberId};
pub use value::Value;
pub use watcher::{Expr, Watcher};
