//! Observable Graph
//!
//! An [`ObservedNode`] is one instrumented object or array: a slot table in
//! which every own property is a reactive location. Instrumentation is in
//! place; the node tree *is* the data tree, there is no shadow structure.
//!
//! # How Instrumentation Works
//!
//! 1. [`observe_json`] walks a plain JSON value with an explicit worklist and
//!    converts every container into a node and every own property into a
//!    data slot backed by a fresh dependency set.
//!
//! 2. Reading a slot while a tracking frame is active adds an edge from the
//!    slot's dependency set to the active subscriber. If the slot holds an
//!    object, the nested node's own dependency set is wired too, so replacing
//!    a whole descendant still reaches subscribers that only read the object
//!    reference.
//!
//! 3. Writing a slot with a value identical to the current one is a no-op.
//!    Any other write replaces the value and notifies the slot's dependency
//!    set before the write call returns.
//!
//! # Slot Kinds
//!
//! Besides plain data slots, a node can carry alias slots (transparent
//! read/write forwarding to another container's slot, used to surface nested
//! storage fields at a flat name) and computed slots (a getter called on
//! every read, with an optional setter defaulting to a no-op). Neither has a
//! dependency set of its own: tracking flows through whatever data slots the
//! forwarded or computed read touches.
//!
//! # Locking
//!
//! The slot table sits behind a `parking_lot::RwLock` with short, enclosed
//! scopes. No lock is held while user code (a getter, a setter, a subscriber
//! update) runs, so re-entrant reads and writes from inside callbacks are
//! fine.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::context::EvalContext;
use super::dep::Dep;
use super::value::Value;

/// Counter for generating unique node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique node ID.
fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Getter for a computed slot. Receives the node the slot is defined on.
pub type ComputedGetter = Arc<dyn Fn(&ObservedNode) -> Value + Send + Sync>;

/// Setter for a computed slot.
pub type ComputedSetter = Arc<dyn Fn(&ObservedNode, Value) + Send + Sync>;

/// Whether a node instruments an object or an array.
///
/// Arrays are observed as nodes with decimal index keys frozen at observe
/// time; there is no push/splice interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A string-keyed object.
    Map,
    /// An array, keyed by decimal indices.
    List,
}

/// One property location on a node.
enum Slot {
    /// A reactive property: the stored value plus its subscriber registry.
    Data { value: Value, dep: Dep },
    /// Transparent forwarding to `source[key]`.
    Alias { source: ObservedNode, key: String },
    /// A getter evaluated on every read; no caching, no dep of its own.
    Computed {
        get: ComputedGetter,
        set: Option<ComputedSetter>,
    },
}

/// What a read found, extracted under the lock so the lock can drop before
/// any tracking or user code runs.
enum SlotRead {
    Data(Value, Dep),
    Alias(ObservedNode, String),
    Computed(ComputedGetter),
    Missing,
}

struct NodeInner {
    id: u64,
    kind: NodeKind,
    /// Whole-object dependency set: notified when a child slot appears or
    /// disappears, and wired by readers of the object reference itself.
    dep: Dep,
    /// Slots in source key order.
    slots: RwLock<IndexMap<String, Slot>>,
}

/// A handle to one instrumented object or array.
///
/// Cloning produces another handle to the same node; node identity (what
/// `Value`'s equality uses for objects) is handle-independent.
pub struct ObservedNode {
    inner: Arc<NodeInner>,
}

impl ObservedNode {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: next_node_id(),
                kind,
                dep: Dep::new(),
                slots: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Create an empty instrumented object.
    pub fn new_map() -> Self {
        Self::with_kind(NodeKind::Map)
    }

    /// Create an empty instrumented array.
    pub fn new_list() -> Self {
        Self::with_kind(NodeKind::List)
    }

    /// Get the node's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this node instruments an object or an array.
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    /// Check whether two handles refer to the same node.
    pub fn same_node(&self, other: &ObservedNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The node's whole-object dependency set.
    pub(crate) fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Read a slot.
    ///
    /// A tracked read wires the slot's dependency set to the active
    /// subscriber; if the value is an object, the nested node's own
    /// dependency set is wired as well. Reading a missing key yields
    /// `Undefined` and wires nothing.
    pub fn get(&self, key: &str) -> Value {
        let read = {
            let slots = self.inner.slots.read();
            match slots.get(key) {
                Some(Slot::Data { value, dep }) => SlotRead::Data(value.clone(), dep.clone()),
                Some(Slot::Alias { source, key }) => {
                    SlotRead::Alias(source.clone(), key.clone())
                }
                Some(Slot::Computed { get, .. }) => SlotRead::Computed(Arc::clone(get)),
                None => SlotRead::Missing,
            }
        };

        match read {
            SlotRead::Data(value, dep) => {
                dep.depend();
                if let Value::Object(child) = &value {
                    child.dep().depend();
                }
                value
            }
            SlotRead::Alias(source, key) => source.get(&key),
            SlotRead::Computed(get) => get(self),
            SlotRead::Missing => Value::Undefined,
        }
    }

    /// Read a slot without wiring any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        EvalContext::untracked(|| self.get(key))
    }

    /// Write a slot.
    ///
    /// Writing a value identical to the current one is a no-op. Otherwise
    /// the value is replaced and the slot's dependency set notifies before
    /// this call returns. Writing a missing key inserts a fresh data slot
    /// and notifies the node's own dependency set instead (a new child
    /// became observable). Alias writes forward to the source container;
    /// computed writes invoke the setter, or do nothing without one.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();

        enum WriteAction {
            Notify(Dep),
            Forward(ObservedNode, String, Value),
            Invoke(ComputedSetter, Value),
            Inserted(Dep),
            Nothing,
        }

        let action = {
            let mut slots = self.inner.slots.write();
            match slots.entry(key.to_string()) {
                indexmap::map::Entry::Occupied(mut entry) => match entry.get_mut() {
                    Slot::Data {
                        value: current,
                        dep,
                    } => {
                        if *current == value {
                            WriteAction::Nothing
                        } else {
                            *current = value;
                            WriteAction::Notify(dep.clone())
                        }
                    }
                    Slot::Alias { source, key } => {
                        WriteAction::Forward(source.clone(), key.clone(), value)
                    }
                    Slot::Computed { set, .. } => match set {
                        Some(setter) => WriteAction::Invoke(Arc::clone(setter), value),
                        None => WriteAction::Nothing,
                    },
                },
                indexmap::map::Entry::Vacant(entry) => {
                    entry.insert(Slot::Data {
                        value,
                        dep: Dep::new(),
                    });
                    WriteAction::Inserted(self.inner.dep.clone())
                }
            }
        };

        match action {
            WriteAction::Notify(dep) => dep.notify(),
            WriteAction::Forward(source, key, value) => source.set(&key, value),
            WriteAction::Invoke(setter, value) => setter(self, value),
            WriteAction::Inserted(node_dep) => node_dep.notify(),
            WriteAction::Nothing => {}
        }
    }

    /// Remove a slot.
    ///
    /// Returns the removed data value, if the slot was a data slot. The
    /// removed slot's dependency set notifies first (its subscribers just
    /// watched the value disappear), then the node's own.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut slots = self.inner.slots.write();
            slots.shift_remove(key)
        };

        match removed {
            Some(Slot::Data { value, dep }) => {
                dep.notify();
                self.inner.dep.notify();
                Some(value)
            }
            Some(_) => {
                self.inner.dep.notify();
                None
            }
            None => None,
        }
    }

    /// Define an alias slot: `self[name]` reads and writes through to
    /// `source[key]`. Replaces any existing slot under that name.
    pub fn define_alias(&self, name: &str, source: &ObservedNode, key: &str) {
        {
            let mut slots = self.inner.slots.write();
            slots.insert(
                name.to_string(),
                Slot::Alias {
                    source: source.clone(),
                    key: key.to_string(),
                },
            );
        }
        self.inner.dep.notify();
    }

    /// Define a computed slot: `self[name]` evaluates `get` on every read.
    /// Without a setter, writes are no-ops. Replaces any existing slot under
    /// that name.
    pub fn define_computed(&self, name: &str, get: ComputedGetter, set: Option<ComputedSetter>) {
        {
            let mut slots = self.inner.slots.write();
            slots.insert(name.to_string(), Slot::Computed { get, set });
        }
        self.inner.dep.notify();
    }

    /// Insert a data slot without notifying anyone. Used by the
    /// instrumentation walk, which runs before any subscriber exists.
    pub(crate) fn insert_slot_raw(&self, key: String, value: Value) {
        self.inner.slots.write().insert(
            key,
            Slot::Data {
                value,
                dep: Dep::new(),
            },
        );
    }

    /// The node's keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.slots.read().keys().cloned().collect()
    }

    /// Number of slots on the node.
    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    /// Whether the node has no slots.
    pub fn is_empty(&self) -> bool {
        self.inner.slots.read().is_empty()
    }

    /// Check whether a key has a slot.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.slots.read().contains_key(key)
    }

    /// Deep-export the node's data slots as plain JSON.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut visited = HashSet::new();
        self.snapshot_with(&mut visited)
    }

    pub(crate) fn snapshot_with(&self, visited: &mut HashSet<u64>) -> serde_json::Value {
        // A node still on the export path exports as null; anything else
        // would recurse forever on a grafted cycle.
        if !visited.insert(self.inner.id) {
            return serde_json::Value::Null;
        }

        let entries: Vec<(String, Value)> = EvalContext::untracked(|| {
            self.inner
                .slots
                .read()
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Data { value, .. } => Some((key.clone(), value.clone())),
                    _ => None,
                })
                .collect()
        });

        let result = match self.inner.kind {
            NodeKind::Map => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key, value.snapshot_with(visited));
                }
                serde_json::Value::Object(map)
            }
            NodeKind::List => serde_json::Value::Array(
                entries
                    .into_iter()
                    .map(|(_, value)| value.snapshot_with(visited))
                    .collect(),
            ),
        };

        visited.remove(&self.inner.id);
        result
    }
}

impl Clone for ObservedNode {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ObservedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedNode")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Get the node backing a value, if the value is an object.
///
/// Every `Value::Object` is instrumented by construction, so this is also
/// the idempotency story: observing an already-observed value hands back
/// the same node rather than re-instrumenting anything.
pub fn observe(value: &Value) -> Option<ObservedNode> {
    value.as_node().cloned()
}

/// Instrument a plain JSON value.
///
/// Scalars pass through unchanged; containers become observed nodes with one
/// data slot per own property, however deeply nested. The walk is iterative
/// (an explicit FIFO worklist) and needs no cycle guard: owned JSON trees
/// are acyclic by construction.
pub fn observe_json(data: serde_json::Value) -> Value {
    fn attach(
        node: &ObservedNode,
        key: String,
        json: serde_json::Value,
        queue: &mut VecDeque<(ObservedNode, serde_json::Value)>,
    ) {
        let value = match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            container => {
                let child = match container {
                    serde_json::Value::Array(_) => ObservedNode::new_list(),
                    _ => ObservedNode::new_map(),
                };
                queue.push_back((child.clone(), container));
                Value::Object(child)
            }
        };
        node.insert_slot_raw(key, value);
    }

    match data {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(s),
        root => {
            let node = match root {
                serde_json::Value::Array(_) => ObservedNode::new_list(),
                _ => ObservedNode::new_map(),
            };

            let mut queue = VecDeque::new();
            queue.push_back((node.clone(), root));

            while let Some((target, json)) = queue.pop_front() {
                match json {
                    serde_json::Value::Object(map) => {
                        for (key, child) in map {
                            attach(&target, key, child, &mut queue);
                        }
                    }
                    serde_json::Value::Array(items) => {
                        for (index, child) in items.into_iter().enumerate() {
                            attach(&target, index.to_string(), child, &mut queue);
                        }
                    }
                    _ => {}
                }
            }

            Value::Object(node)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::{Subscriber, SubscriberId};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;

    /// Subscriber double that records updates and subscribes itself to every
    /// dep it is offered, once per dep.
    struct RecordingSubscriber {
        id: SubscriberId,
        updates: AtomicUsize,
        seen: Mutex<Vec<u64>>,
        weak_self: Weak<RecordingSubscriber>,
    }

    impl RecordingSubscriber {
        fn new() -> Arc<Self> {
            Arc::new_cyclic(|weak| Self {
                id: SubscriberId::new(),
                updates: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                weak_self: weak.clone(),
            })
        }

        fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }

        fn dep_count(&self) -> usize {
            self.seen.lock().len()
        }

        fn track<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
            let dyn_self: Arc<dyn Subscriber> = Arc::clone(self) as Arc<dyn Subscriber>;
            let _frame = EvalContext::enter(&dyn_self);
            f()
        }
    }

    impl Subscriber for RecordingSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, dep: &Dep) {
            let mut seen = self.seen.lock();
            if !seen.contains(&dep.id().raw()) {
                seen.push(dep.id().raw());
                let weak: Weak<dyn Subscriber> = self.weak_self.clone();
                dep.add_subscriber(weak);
            }
        }

        fn update(&self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn node_of(value: &Value) -> ObservedNode {
        observe(value).expect("value should be an object")
    }

    #[test]
    fn observe_json_instruments_nested_containers() {
        let value = observe_json(json!({
            "message": "hi",
            "nested": {"deep": {"n": 1}},
            "items": [10, 20],
        }));

        let root = node_of(&value);
        assert_eq!(root.kind(), NodeKind::Map);
        assert_eq!(root.keys(), vec!["message", "nested", "items"]);

        assert_eq!(root.get("message"), Value::from("hi"));

        let nested = node_of(&root.get("nested"));
        let deep = node_of(&nested.get("deep"));
        assert_eq!(deep.get("n"), Value::from(1.0));

        let items = node_of(&root.get("items"));
        assert_eq!(items.kind(), NodeKind::List);
        assert_eq!(items.get("0"), Value::from(10.0));
        assert_eq!(items.get("1"), Value::from(20.0));
    }

    #[test]
    fn observe_passes_through_scalars() {
        assert!(observe(&Value::Null).is_none());
        assert!(observe(&Value::Undefined).is_none());
        assert!(observe(&Value::from(1.0)).is_none());
        assert!(observe(&Value::from("x")).is_none());
    }

    #[test]
    fn observe_is_idempotent() {
        let value = observe_json(json!({"a": 1}));
        let first = observe(&value).unwrap();
        let second = observe(&value).unwrap();
        assert!(first.same_node(&second));
    }

    #[test]
    fn tracked_read_wires_exactly_one_edge() {
        let value = observe_json(json!({"k": 1}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get("k");
            root.get("k");
            root.get("k");
        });

        // Repeated reads of the same slot collapse to one edge.
        assert_eq!(sub.dep_count(), 1);

        root.set("k", 2.0);
        assert_eq!(sub.update_count(), 1);
    }

    #[test]
    fn untracked_read_wires_nothing() {
        let value = observe_json(json!({"k": 1}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get_untracked("k");
        });

        assert_eq!(sub.dep_count(), 0);
        root.set("k", 2.0);
        assert_eq!(sub.update_count(), 0);
    }

    #[test]
    fn reading_an_object_slot_wires_the_child_node_too() {
        let value = observe_json(json!({"child": {"n": 1}}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get("child");
        });

        // Slot dep plus the nested node's own dep.
        assert_eq!(sub.dep_count(), 2);
    }

    #[test]
    fn identical_write_is_a_no_op() {
        let value = observe_json(json!({"k": "hi", "child": {}}));
        let root = node_of(&value);
        let child = root.get_untracked("child");
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get("k");
            root.get("child");
        });

        root.set("k", "hi");
        root.set("child", child);
        assert_eq!(sub.update_count(), 0);

        root.set("k", "bye");
        assert_eq!(sub.update_count(), 1);
    }

    #[test]
    fn write_notifies_before_returning() {
        let value = observe_json(json!({"k": 1}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get("k");
        });

        root.set("k", 2.0);
        assert_eq!(sub.update_count(), 1);
        root.set("k", 3.0);
        assert_eq!(sub.update_count(), 2);
    }

    #[test]
    fn missing_key_reads_undefined_and_wires_nothing() {
        let value = observe_json(json!({}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        let read = sub.track(|| root.get("ghost"));
        assert_eq!(read, Value::Undefined);
        assert_eq!(sub.dep_count(), 0);
    }

    #[test]
    fn new_key_write_notifies_the_node_dep() {
        let value = observe_json(json!({"k": 1}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        // Reading the object reference from a parent wires the node dep.
        let outer = observe_json(json!({}));
        let outer_node = node_of(&outer);
        outer_node.set("inner", value.clone());
        sub.track(|| {
            outer_node.get("inner");
        });

        root.set("fresh", 2.0);
        assert_eq!(sub.update_count(), 1);
        assert_eq!(root.get_untracked("fresh"), Value::from(2.0));
    }

    #[test]
    fn remove_notifies_slot_then_node() {
        let value = observe_json(json!({"k": 1}));
        let root = node_of(&value);
        let sub = RecordingSubscriber::new();

        sub.track(|| {
            root.get("k");
        });

        let removed = root.remove("k");
        assert_eq!(removed, Some(Value::from(1.0)));
        assert_eq!(sub.update_count(), 1);
        assert!(!root.contains_key("k"));
        assert_eq!(root.remove("k"), None);
    }

    #[test]
    fn alias_slot_forwards_reads_and_writes() {
        let data = observe_json(json!({"message": "hi"}));
        let data_node = node_of(&data);
        let root = ObservedNode::new_map();
        root.define_alias("message", &data_node, "message");

        assert_eq!(root.get("message"), Value::from("hi"));

        root.set("message", "bye");
        assert_eq!(data_node.get_untracked("message"), Value::from("bye"));
    }

    #[test]
    fn alias_read_tracks_through_the_source_slot() {
        let data = observe_json(json!({"message": "hi"}));
        let data_node = node_of(&data);
        let root = ObservedNode::new_map();
        root.define_alias("message", &data_node, "message");

        let sub = RecordingSubscriber::new();
        sub.track(|| {
            root.get("message");
        });

        // Writing the source slot reaches the alias reader.
        data_node.set("message", "bye");
        assert_eq!(sub.update_count(), 1);
    }

    #[test]
    fn computed_slot_evaluates_on_every_read() {
        let data = observe_json(json!({"n": 2}));
        let data_node = node_of(&data);
        let root = ObservedNode::new_map();
        root.define_alias("n", &data_node, "n");

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        root.define_computed(
            "doubled",
            Arc::new(move |node| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                match node.get("n") {
                    Value::Number(n) => Value::Number(n * 2.0),
                    _ => Value::Undefined,
                }
            }),
            None,
        );

        assert_eq!(root.get("doubled"), Value::from(4.0));
        assert_eq!(root.get("doubled"), Value::from(4.0));
        // No caching: one getter call per read.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_write_without_setter_is_a_no_op() {
        let root = ObservedNode::new_map();
        root.define_computed("c", Arc::new(|_| Value::from(1.0)), None);

        root.set("c", 99.0);
        assert_eq!(root.get("c"), Value::from(1.0));
    }

    #[test]
    fn computed_setter_receives_the_write() {
        let data = observe_json(json!({"n": 1}));
        let data_node = node_of(&data);
        let root = ObservedNode::new_map();

        let target = data_node.clone();
        root.define_computed(
            "n2",
            Arc::new(|_| Value::Undefined),
            Some(Arc::new(move |_, value| target.set("n", value))),
        );

        root.set("n2", 7.0);
        assert_eq!(data_node.get_untracked("n"), Value::from(7.0));
    }

    #[test]
    fn snapshot_exports_data_slots_only() {
        let data = observe_json(json!({"a": 1, "b": {"c": [true, null]}}));
        let data_node = node_of(&data);
        data_node.define_computed("derived", Arc::new(|_| Value::from(9.0)), None);

        assert_eq!(data.snapshot(), json!({"a": 1.0, "b": {"c": [true, null]}}));
    }

    #[test]
    fn snapshot_guards_grafted_cycles() {
        let value = observe_json(json!({"name": "root"}));
        let root = node_of(&value);
        root.set("me", value.clone());

        assert_eq!(
            value.snapshot(),
            json!({"name": "root", "me": null})
        );
    }

    #[test]
    fn key_order_is_preserved() {
        let value = observe_json(json!({"z": 1, "a": 2, "m": 3}));
        let root = node_of(&value);
        assert_eq!(root.keys(), vec!["z", "a", "m"]);
    }
}
