//! View-Model Assembly
//!
//! The glue an external template binder consumes: ingest a plain data
//! object, instrument it, surface its fields at flat names on a root node,
//! attach computed properties, and hand out watchers.
//!
//! # Layout
//!
//! A [`ViewModel`] owns two nodes. The *data node* is the instrumented form
//! of the ingested object. The *root node* is what bindings evaluate
//! against: one alias slot per non-reserved data key (reads and writes flow
//! through to the data node, so reactivity is untouched) plus one computed
//! slot per declared computed property.
//!
//! Keys starting with `$` or `_` are reserved and are reachable only
//! through the data node, never at a flat name.
//!
//! # Collisions
//!
//! A data key that matches a declared method name still aliases but is
//! reported; a data key that matches a declared prop name is reported and
//! *not* aliased (the prop owns the flat name). Both channels are used:
//! `tracing::warn!` and a warning list retained on the view-model. Neither
//! is fatal.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::reactive::{
    observe_json, ComputedGetter, ComputedSetter, EvalContext, Expr, ObservedNode, Value, Watcher,
};

/// What a data key collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// The key is also a declared method name.
    Method,
    /// The key is also a declared prop name.
    Prop,
}

/// A non-fatal naming collision found while assembling the view-model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    /// The colliding data key.
    pub key: String,
    /// What it collided with.
    pub kind: CollisionKind,
}

impl fmt::Display for NameCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CollisionKind::Method => write!(
                f,
                "data key {:?} is already defined as a method",
                self.key
            ),
            CollisionKind::Prop => write!(
                f,
                "data key {:?} is already declared as a prop; use the prop default instead",
                self.key
            ),
        }
    }
}

/// Check if a key starts with `$` or `_`.
fn is_reserved(key: &str) -> bool {
    matches!(key.as_bytes().first(), Some(b'$') | Some(b'_'))
}

enum DataSource {
    Value(serde_json::Value),
    Factory(Box<dyn FnOnce() -> serde_json::Value>),
}

struct ComputedDef {
    get: ComputedGetter,
    set: Option<ComputedSetter>,
}

/// Builder for a [`ViewModel`].
#[derive(Default)]
pub struct ViewModelBuilder {
    data: Option<DataSource>,
    computed: IndexMap<String, ComputedDef>,
    methods: Vec<String>,
    props: Vec<String>,
}

impl ViewModelBuilder {
    /// Supply the data object directly.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(DataSource::Value(data));
        self
    }

    /// Supply the data object through a factory, called once at build time.
    pub fn data_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> serde_json::Value + 'static,
    {
        self.data = Some(DataSource::Factory(Box::new(factory)));
        self
    }

    /// Declare a computed property: `name` evaluates the getter on every
    /// read; writes are no-ops.
    pub fn computed<F>(mut self, name: impl Into<String>, get: F) -> Self
    where
        F: Fn(&ObservedNode) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(
            name.into(),
            ComputedDef {
                get: Arc::new(get),
                set: None,
            },
        );
        self
    }

    /// Declare a computed property with a setter.
    pub fn computed_with_setter<G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
    where
        G: Fn(&ObservedNode) -> Value + Send + Sync + 'static,
        S: Fn(&ObservedNode, Value) + Send + Sync + 'static,
    {
        self.computed.insert(
            name.into(),
            ComputedDef {
                get: Arc::new(get),
                set: Some(Arc::new(set)),
            },
        );
        self
    }

    /// Declare a method name, for collision diagnostics. Handler storage is
    /// the binder's concern, not the core's.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    /// Declare an external-input (prop) name, for collision diagnostics.
    pub fn prop(mut self, name: impl Into<String>) -> Self {
        self.props.push(name.into());
        self
    }

    /// Assemble the view-model.
    pub fn build(self) -> ViewModel {
        let data = match self.data {
            Some(DataSource::Value(value)) => value,
            Some(DataSource::Factory(factory)) => factory(),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        let data_node = match observe_json(data) {
            Value::Object(node) => node,
            other => {
                warn!(got = %other, "data source did not produce an object, using an empty one");
                ObservedNode::new_map()
            }
        };

        let root = ObservedNode::new_map();
        let mut warnings = Vec::new();

        for key in data_node.keys() {
            if self.methods.iter().any(|name| *name == key) {
                let collision = NameCollision {
                    key: key.clone(),
                    kind: CollisionKind::Method,
                };
                warn!("{}", collision);
                warnings.push(collision);
            }
            if self.props.iter().any(|name| *name == key) {
                let collision = NameCollision {
                    key: key.clone(),
                    kind: CollisionKind::Prop,
                };
                warn!("{}", collision);
                warnings.push(collision);
            } else if !is_reserved(&key) {
                root.define_alias(&key, &data_node, &key);
            }
        }

        for (name, def) in self.computed {
            root.define_computed(&name, def.get, def.set);
        }

        ViewModel {
            root,
            data: data_node,
            warnings,
        }
    }
}

/// An assembled view-model: the evaluation root bindings run against.
pub struct ViewModel {
    root: ObservedNode,
    data: ObservedNode,
    warnings: Vec<NameCollision>,
}

impl ViewModel {
    /// Start building a view-model.
    pub fn builder() -> ViewModelBuilder {
        ViewModelBuilder::default()
    }

    /// The root value bindings evaluate against.
    pub fn root(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// The root node (aliases and computed slots).
    pub fn root_node(&self) -> &ObservedNode {
        &self.root
    }

    /// The instrumented data node, including reserved keys.
    pub fn data_node(&self) -> &ObservedNode {
        &self.data
    }

    /// Naming collisions found at build time.
    pub fn warnings(&self) -> &[NameCollision] {
        &self.warnings
    }

    /// Create a live binding. `on_change(new, old)` fires on every change
    /// of the evaluated value.
    pub fn watch<F>(&self, expr: impl Into<Expr>, on_change: F) -> Watcher
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        Watcher::new(self.root(), expr, on_change)
    }

    /// Read a path without wiring any dependency. An invalid path reads as
    /// `Undefined`.
    pub fn get(&self, path: &str) -> Value {
        match crate::reactive::parse_path(path) {
            Ok(accessor) => EvalContext::untracked(|| accessor.get(&self.root())),
            Err(_) => Value::Undefined,
        }
    }

    /// Write through a path, as a two-way binding would. Returns `false`
    /// if the path is invalid or dead.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> bool {
        match crate::reactive::parse_path(path) {
            Ok(accessor) => accessor.set(&self.root(), value),
            Err(_) => false,
        }
    }

    /// Export the current data as plain JSON.
    pub fn snapshot(&self) -> serde_json::Value {
        self.data.snapshot()
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("root", &self.root)
            .field("data", &self.data)
            .field("warnings", &self.warnings)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
