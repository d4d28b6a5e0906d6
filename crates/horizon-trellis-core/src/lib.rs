//! Reactivity engine for Horizon Trellis.
//!
//! This crate binds a data tree to a [`Document`](horizon_trellis_dom::Document):
//!
//! - **Store**: a path-addressed tree of objects, arrays and primitives
//!   ([`Store`], [`Reactive`])
//! - **Computed values**: functions whose dependencies are recorded on first
//!   evaluation and which re-run when any of them change
//! - **Propagation**: every write notifies watchers, then runs the directives
//!   bound to the written path, then re-runs dependent computeds
//! - **Directives**: `mark`, `if` and `ifnot` built in, plus custom and
//!   parametric directives bound through prefixed attributes
//! - **Lists**: arrays render through a `path.#` placeholder that is cloned
//!   once per item
//! - **Asynchronous values**: pending computeds and [`Store::set_async`]
//!   settle into regular propagation when polled
//!
//! # Example
//!
//! ```
//! use horizon_trellis_core::{Store, TrellisConfig, Value};
//!
//! let store = Store::from_html(
//!     r#"<ul><li sb-mark="todos.#"></li></ul><p sb-if="done">all done</p>"#,
//!     TrellisConfig::default(),
//! ).unwrap();
//!
//! store.set("todos", Value::array(["write", "test"]));
//! store.set("done", false);
//! store.node("todos").push(["ship"]);
//!
//! let doc = store.document();
//! assert_eq!(doc.text_content(doc.query_attr_eq("sb-mark", "todos.2")[0]), "ship");
//! assert!(doc.query_attr_eq("sb-if", "done").iter().all(|&el| doc.tag_name(el).as_deref() == Some("template")));
//! ```
//!
//! # Threading
//!
//! [`Store`] is `Send + Sync`. Dependency recording is tied to the thread
//! evaluating a computed, so reads made on other threads at the same time
//! are never captured.

mod config;
mod data;
mod deps;
mod directive;
mod error;
mod list;
pub mod logging;
pub mod path;
mod pending;
mod propagate;
mod reactive;
mod store;
mod value;
mod watch;

pub use config::{DEFAULT_PREFIX, TrellisConfig};
pub use deps::Owner;
pub use directive::{DirectiveHandler, DirectiveParams, IF, IFNOT, MARK};
pub use error::{ComputeError, Result, TrellisError};
pub use reactive::Reactive;
pub use store::Store;
pub use value::{Computation, Computed, ComputedId, Map, Value, text_of, truthy};
pub use watch::{Watcher, WatcherId};

pub use horizon_trellis_dom as dom;
