//! Dynamic Value Model
//!
//! [`Value`] is the data type that flows through the reactivity core: the
//! JSON scalar types, plus an explicit `Undefined` for reads that resolve to
//! nothing, plus `Object` for instrumented containers.
//!
//! # Identity Equality
//!
//! `PartialEq` on `Value` is the "identical" relation slot writes and watcher
//! change detection use:
//!
//! - Scalars compare by value. `Number` uses IEEE `==`, so `NaN != NaN` and a
//!   write of NaN over NaN notifies.
//!
//! - `Object` compares by node identity. Two structurally equal but distinct
//!   objects are unequal, and a nested object mutated in place is still the
//!   same value unless the reference itself was replaced.
//!
//! # Truthiness
//!
//! `Undefined`, `Null`, `false`, `0`, `NaN`, and the empty string are falsy;
//! everything else is truthy. Only path traversal consults truthiness (a
//! falsy intermediate dead-ends the walk).

use std::collections::HashSet;
use std::fmt;

use serde::ser::{Serialize, Serializer};

use super::observe::{observe_json, ObservedNode};

/// A dynamic value held in an observable slot.
///
/// Cloning is cheap: scalars copy, strings clone their buffer, and objects
/// clone a handle to the shared node.
#[derive(Clone)]
pub enum Value {
    /// The result of reading a missing slot or a dead path.
    Undefined,
    /// An explicit null in the data.
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// A numeric scalar. All numbers are f64, as in the JSON data model.
    Number(f64),
    /// A string scalar.
    Str(String),
    /// A handle to an instrumented object or array.
    Object(ObservedNode),
}

impl Value {
    /// JS-style truthiness, used by path short-circuiting.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Check whether this is `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check whether this is an instrumented object or array.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Borrow the backing node, if this is an object.
    pub fn as_node(&self) -> Option<&ObservedNode> {
        match self {
            Value::Object(node) => Some(node),
            _ => None,
        }
    }

    /// Borrow the string, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number, if this is a numeric scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean, if this is a boolean scalar.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Deep-export the current data as plain JSON.
    ///
    /// Only data slots are exported; aliases and computeds are views, not
    /// data. The export runs untracked (taking a snapshot does not subscribe
    /// anything) and guards against reference cycles by emitting `null` when
    /// a node is revisited while still on the export path. `Undefined` and
    /// non-finite numbers export as `null`, as they would in JSON.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut visited = HashSet::new();
        self.snapshot_with(&mut visited)
    }

    pub(crate) fn snapshot_with(&self, visited: &mut HashSet<u64>) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Object(node) => node.snapshot_with(visited),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // IEEE equality: NaN is never identical to anything.
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same_node(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Render the value the way a text binding sink would substitute it:
    /// `Undefined` as the empty string, scalars naturally, objects as their
    /// JSON snapshot.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(node) => write!(f, "{}", node.snapshot()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(node) => write!(f, "Object(node {})", node.id()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ObservedNode> for Value {
    fn from(node: ObservedNode) -> Self {
        Value::Object(node)
    }
}

impl From<serde_json::Value> for Value {
    /// Instrumenting conversion: containers come back as observed nodes.
    fn from(data: serde_json::Value) -> Self {
        observe_json(data)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
