//! Watcher Implementation
//!
//! A Watcher is one live binding: it evaluates an expression against the
//! data root, remembers the result, and fires a callback with `(new, old)`
//! when a re-evaluation produces a different value.
//!
//! # How Watchers Work
//!
//! 1. Construction compiles the expression (or takes an accessor directly)
//!    and evaluates it once, establishing the baseline value and seeding
//!    dependency edges. There is no separate first-render path: the binder
//!    reads the initial value off the fresh watcher.
//!
//! 2. Evaluation pushes the watcher onto the tracking stack through an RAII
//!    frame, so every slot the getter reads offers its dependency set back
//!    via `add_dep`. The frame pops on every exit path, including unwinding.
//!
//! 3. `add_dep` keeps a map of dependency-set IDs it has already joined and
//!    subscribes at most once per set, no matter how many times one
//!    evaluation reads the same slot. A watcher never leaves a set it
//!    joined, even if later evaluations stop reading it; re-notification is
//!    harmless because the value comparison suppresses the callback.
//!
//! 4. `update` re-evaluates and fires the callback only when the new value
//!    is not identical to the cached one.
//!
//! # Lifecycle
//!
//! Dependency sets hold watchers weakly. Dropping every handle to a watcher
//! retires all its subscriptions; there is no explicit unsubscribe.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::context::EvalContext;
use super::dep::{Dep, DepId};
use super::path::{parse_path, PathAccessor};
use super::subscriber::{Subscriber, SubscriberId};
use super::value::Value;

/// A binding expression: either a dotted property path or a caller-supplied
/// accessor over the data root.
#[derive(Clone)]
pub enum Expr {
    /// A dotted path, compiled at watcher construction.
    Path(String),
    /// A function evaluated against the data root.
    Accessor(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
}

impl Expr {
    /// Build a path expression.
    pub fn path(path: impl Into<String>) -> Self {
        Expr::Path(path.into())
    }

    /// Build an accessor expression.
    pub fn accessor<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Expr::Accessor(Arc::new(f))
    }
}

impl From<&str> for Expr {
    fn from(path: &str) -> Self {
        Expr::Path(path.to_string())
    }
}

impl From<String> for Expr {
    fn from(path: String) -> Self {
        Expr::Path(path)
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Expr::Accessor(_) => f.debug_tuple("Accessor").finish(),
        }
    }
}

/// The compiled form of an expression.
enum Getter {
    Path(PathAccessor),
    Accessor(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
    /// A rejected path. Evaluates to `Undefined` and reads nothing.
    Inert,
}

struct WatcherInner {
    id: SubscriberId,
    root: Value,
    getter: Getter,
    on_change: Box<dyn Fn(&Value, &Value) + Send + Sync>,
    /// Dependency sets already joined, keyed by ID for duplicate
    /// suppression.
    deps: Mutex<HashMap<DepId, Dep>>,
    /// Last evaluated value.
    value: Mutex<Value>,
    /// Handle to self, handed to dependency sets as the weak subscriber.
    weak_self: Weak<WatcherInner>,
}

impl WatcherInner {
    fn evaluate(&self) -> Value {
        let subscriber = match self.weak_self.upgrade() {
            Some(strong) => strong as Arc<dyn Subscriber>,
            None => return Value::Undefined,
        };

        let _frame = EvalContext::enter(&subscriber);
        match &self.getter {
            Getter::Path(accessor) => accessor.get(&self.root),
            Getter::Accessor(f) => f(&self.root),
            Getter::Inert => Value::Undefined,
        }
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Dep) {
        let mut deps = self.deps.lock();
        if !deps.contains_key(&dep.id()) {
            let weak: Weak<dyn Subscriber> = self.weak_self.clone();
            dep.add_subscriber(weak);
            deps.insert(dep.id(), dep.clone());
        }
    }

    fn update(&self) {
        let new = self.evaluate();
        let old = self.value.lock().clone();
        if new != old {
            *self.value.lock() = new.clone();
            (self.on_change)(&new, &old);
        }
    }
}

/// A live binding over the data root.
///
/// Cloning shares state: both handles see the same cached value and the
/// same subscriptions. The watcher stays subscribed for as long as any
/// handle lives.
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher and evaluate it once.
    ///
    /// A `Path` expression that fails to compile degrades to an inert
    /// binding (evaluates to `Undefined`, reads nothing) rather than an
    /// error; the rejection is logged at debug level.
    pub fn new<F>(root: Value, expr: impl Into<Expr>, on_change: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let getter = match expr.into() {
            Expr::Path(path) => match parse_path(&path) {
                Ok(accessor) => Getter::Path(accessor),
                Err(err) => {
                    debug!(%err, "binding expression rejected, watcher is inert");
                    Getter::Inert
                }
            },
            Expr::Accessor(f) => Getter::Accessor(f),
        };

        let inner = Arc::new_cyclic(|weak| WatcherInner {
            id: SubscriberId::new(),
            root,
            getter,
            on_change: Box::new(on_change),
            deps: Mutex::new(HashMap::new()),
            value: Mutex::new(Value::Undefined),
            weak_self: weak.clone(),
        });

        // Baseline evaluation: establishes the initial value and seeds the
        // dependency edges.
        let initial = inner.evaluate();
        *inner.value.lock() = initial;

        Self { inner }
    }

    /// Get the watcher's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// The last evaluated value.
    pub fn value(&self) -> Value {
        self.inner.value.lock().clone()
    }

    /// Evaluate the expression now, wiring dependencies, without touching
    /// the cached value.
    pub fn evaluate(&self) -> Value {
        self.inner.evaluate()
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// This is the same entry point dependency sets call on notification.
    pub fn update(&self) {
        self.inner.update()
    }

    /// Number of distinct dependency sets this watcher has joined.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

impl Clone for Watcher {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("value", &self.value())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
