//! Filament Core
//!
//! This crate provides the reactivity core of the Filament view-binding
//! runtime. It implements:
//!
//! - An observable object model (instrumented nodes, reactive slots)
//! - Automatic dependency tracking between slots and watchers
//! - Property-path compilation for binding expressions
//! - View-model assembly (data ingestion, flat aliasing, computed
//!   properties)
//!
//! What it deliberately does not implement: template parsing, event
//! directive wiring, and concrete view updates. Those belong to an external
//! binder, which consumes this crate through two calls: instrument the data
//! (`ViewModel::builder()`), then create one watcher per live binding
//! (`ViewModel::watch`). The watcher's `(new, old)` callback is the entire
//! contract a binding sink implements.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the dependency-tracking object model and its protocol
//! - `vm`: the assembly layer a template binder consumes
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::{ViewModel, Value};
//! use serde_json::json;
//!
//! let vm = ViewModel::builder()
//!     .data(json!({"message": "hi"}))
//!     .build();
//!
//! // One watcher per live binding.
//! let binding = vm.watch("message", |new, old| {
//!     println!("render {} (was {})", new, old);
//! });
//! assert_eq!(binding.value(), Value::from("hi"));
//!
//! // A write notifies synchronously.
//! vm.set("message", "bye");
//! // Prints: "render bye (was hi)"
//! ```

pub mod reactive;
pub mod vm;

pub use reactive::{
    observe, observe_json, parse_path, Dep, DepId, EvalContext, Expr, NodeKind, ObservedNode,
    PathAccessor, PathError, Subscriber, SubscriberId, Value, Watcher,
};
pub use vm::{CollisionKind, NameCollision, ViewModel, ViewModelBuilder};
