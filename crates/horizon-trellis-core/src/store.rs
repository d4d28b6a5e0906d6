//! The reactive store.
//!
//! [`Store`] owns the data tree, the dependency map, the watcher map and the
//! directive registry for one document. It is an explicit context object:
//! several stores can coexist, each bound to its own [`Document`].
//!
//! # Example
//!
//! ```
//! use horizon_trellis_core::{Store, TrellisConfig, Value};
//!
//! let store = Store::from_html(
//!     r#"<p sb-mark="greeting"></p><p sb-mark="shout"></p>"#,
//!     TrellisConfig::default(),
//! ).unwrap();
//!
//! store.set("greeting", "hello");
//! store.set("shout", Value::computed(|s| {
//!     let text = s.get("greeting")?.as_str()?.to_uppercase();
//!     Some(text.into())
//! }));
//! store.set("greeting", "hey");
//!
//! let doc = store.document();
//! let shout = doc.query_attr_eq("sb-mark", "shout")[0];
//! assert_eq!(doc.text_content(shout), "HEY");
//! ```
//!
//! # Locking
//!
//! Internal locks are released before any user code runs (computed
//! functions, watchers, directive handlers), so all of them may call back
//! into the store.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::ThreadId;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use horizon_trellis_dom::{Document, NodeId, ReadyState};
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};

use crate::config::{TrellisConfig, normalize_prefix};
use crate::data::{Assigned, DataTree, Shape};
use crate::deps::{DependencyMap, Dependent, Owner, Recordings};
use crate::directive::{DirectiveParams, DirectiveRegistry};
use crate::error::Result;
use crate::logging::{PerfSpan, targets};
use crate::path;
use crate::pending::Settled;
use crate::propagate::Dispatch;
use crate::reactive::Reactive;
use crate::value::{Computation, Computed, ComputedId, Value};
use crate::watch::{WatcherId, WatcherMap};

pub(crate) struct StoreInner {
    pub(crate) document: Document,
    pub(crate) config: TrellisConfig,
    pub(crate) prefix: RwLock<String>,
    pub(crate) data: RwLock<DataTree>,
    pub(crate) deps: Mutex<DependencyMap>,
    pub(crate) watchers: Mutex<WatcherMap>,
    pub(crate) directives: RwLock<DirectiveRegistry>,
    /// Open dependency recordings, per thread.
    pub(crate) recording: Mutex<Recordings>,
    /// Computeds currently running, per thread, to cut evaluation cycles.
    pub(crate) evaluating: Mutex<Vec<(ThreadId, ComputedId)>>,
    pub(crate) deferred: Mutex<VecDeque<Dispatch>>,
    pub(crate) flushing: AtomicBool,
    pub(crate) pending: Mutex<FuturesUnordered<BoxFuture<'static, Settled>>>,
}

/// A reactive data store bound to a document.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

static_assertions::assert_impl_all!(Store: Send, Sync);

impl Store {
    /// Create a store bound to `document`.
    ///
    /// Named `<template>` elements already in the document are registered
    /// as components.
    pub fn new(document: Document, config: TrellisConfig) -> Self {
        let prefix = normalize_prefix(&config.prefix);
        if let Err(err) = document.register_templates() {
            tracing::warn!(target: targets::STORE, %err, "failed to register templates");
        }
        tracing::debug!(target: targets::STORE, %prefix, defer = config.defer_until_ready, "store created");

        Self {
            inner: Arc::new(StoreInner {
                document,
                config,
                prefix: RwLock::new(prefix),
                data: RwLock::new(DataTree::new()),
                deps: Mutex::new(DependencyMap::default()),
                watchers: Mutex::new(WatcherMap::default()),
                directives: RwLock::new(DirectiveRegistry::with_builtins()),
                recording: Mutex::new(Recordings::default()),
                evaluating: Mutex::new(Vec::new()),
                deferred: Mutex::new(VecDeque::new()),
                flushing: AtomicBool::new(false),
                pending: Mutex::new(FuturesUnordered::new()),
            }),
        }
    }

    /// Create a store over a document parsed from markup.
    pub fn from_html(markup: &str, config: TrellisConfig) -> Result<Self> {
        Ok(Self::new(Document::from_html(markup)?, config))
    }

    /// The bound document.
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// The configuration the store was created with.
    pub fn config(&self) -> &TrellisConfig {
        &self.inner.config
    }

    /// The current attribute prefix.
    pub fn prefix(&self) -> String {
        self.inner.prefix.read().clone()
    }

    /// Change the attribute prefix. A trailing `-` is added when missing.
    pub fn set_prefix(&self, prefix: &str) {
        *self.inner.prefix.write() = normalize_prefix(prefix);
    }

    /// Full attribute name of a directive.
    pub(crate) fn attr(&self, directive: &str) -> String {
        format!("{}{}", self.inner.prefix.read(), directive)
    }

    /// Handle to the root object.
    pub fn root(&self) -> Reactive {
        Reactive::new(self.clone(), String::new())
    }

    /// Handle to the node at `path`.
    pub fn node(&self, path: &str) -> Reactive {
        Reactive::new(self.clone(), path.to_string())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the value at `path` with computed values resolved.
    ///
    /// Missing paths read as `None`, and so do computeds whose result is
    /// still pending. `list.length` reads an array's length. While a computed
    /// is being registered, every existing path read here becomes one of its
    /// dependencies.
    pub fn get(&self, path: &str) -> Option<Value> {
        let raw = {
            let data = self.inner.data.read();
            self.record_read(&data, path);
            data.read(path)
        };
        raw.and_then(|value| self.resolve(value))
    }

    /// Read without recording and without resolving computeds.
    pub(crate) fn raw(&self, path: &str) -> Option<Value> {
        self.inner.data.read().read(path)
    }

    /// Whether a property exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.inner.data.read().exists(path)
    }

    /// Keys of the object or array at `path`.
    pub fn keys(&self, path: &str) -> Vec<String> {
        self.inner.data.read().keys(path)
    }

    /// Length of the array at `path`.
    pub fn array_len(&self, path: &str) -> Option<usize> {
        self.inner.data.read().array_len(path)
    }

    /// Whether the value at `path` is an array.
    pub fn is_array(&self, path: &str) -> bool {
        self.inner.data.read().shape(path) == Some(Shape::Array)
    }

    pub(crate) fn shape(&self, path: &str) -> Option<Shape> {
        self.inner.data.read().shape(path)
    }

    fn record_read(&self, data: &DataTree, path: &str) {
        let mut recording = self.inner.recording.lock();
        if !recording.is_recording() {
            return;
        }
        let mut prefix = String::new();
        for segment in path::segments(path) {
            prefix = path::join(&prefix, segment);
            if !data.exists(&prefix) {
                break;
            }
            recording.record(&prefix);
        }
    }

    /// Resolve computed values, deeply. Pending results become `None`.
    pub(crate) fn resolve(&self, value: Value) -> Option<Value> {
        match value {
            Value::Computed(computed) => match self.run_computed(&computed) {
                Computation::Ready(result) => result.and_then(|v| self.resolve(v)),
                Computation::Pending(_) => None,
            },
            Value::Array(items) => Some(Value::Array(
                items
                    .into_iter()
                    .map(|item| item.and_then(|v| self.resolve(v)))
                    .collect(),
            )),
            Value::Object(map) => Some(Value::Object(
                map.into_iter()
                    .filter_map(|(k, v)| self.resolve(v).map(|v| (k, v)))
                    .collect(),
            )),
            other => Some(other),
        }
    }

    /// Run a computed function, refusing to re-enter one that is already
    /// running on this thread.
    pub(crate) fn run_computed(&self, computed: &Computed) -> Computation {
        let entry = (std::thread::current().id(), computed.id());
        {
            let mut evaluating = self.inner.evaluating.lock();
            if evaluating.contains(&entry) {
                tracing::warn!(target: targets::DEPS, id = computed.id().as_raw(), "computed reads itself, cycle cut");
                return Computation::Ready(None);
            }
            evaluating.push(entry);
        }

        let result = computed.evaluate(self);

        let mut evaluating = self.inner.evaluating.lock();
        if let Some(pos) = evaluating.iter().rposition(|e| *e == entry) {
            evaluating.remove(pos);
        }
        result
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` at `path` and propagate the change.
    ///
    /// Computed values (including ones nested in objects and arrays) are
    /// registered first: they are evaluated once and subscribed to every
    /// path they read. Watchers run, then directives, then any computed
    /// depending on `path` is re-run.
    ///
    /// Returns `false` without propagating when the parent path does not
    /// resolve to a container, or when `prop` cannot be set on it.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if path.is_empty() {
            tracing::warn!(target: targets::STORE, "the root object cannot be replaced");
            return false;
        }
        let (parent, prop) = path::split_last(path);
        let Some(parent_is_array) = self.accepts(parent, prop, &value) else {
            tracing::debug!(target: targets::STORE, path, "set ignored, no container accepts this property");
            return false;
        };
        let owner = Owner::new(parent, parent_is_array);
        let _span = PerfSpan::new("store.set");

        if prop != "length" || !parent_is_array {
            self.inner.deps.lock().drop_dependents_at(path);
            self.register_computeds(&value, path, &owner, prop);
        }

        let stored = self.inner.data.write().assign(parent, prop, value.clone());
        if !matches!(stored, Assigned::Stored { .. }) {
            return false;
        }
        tracing::trace!(target: targets::STORE, path, "set");

        self.update(Some(value), path, false, &owner, prop, None);
        self.update_computed(path);
        true
    }

    /// Whether `prop` can be assigned on the container at `parent`; returns
    /// whether that container is an array.
    fn accepts(&self, parent: &str, prop: &str, value: &Value) -> Option<bool> {
        match self.shape(parent)? {
            Shape::Object => Some(false),
            Shape::Array if prop == "length" => {
                let valid = value.as_f64().and_then(path::array_length).is_some();
                if !valid {
                    tracing::warn!(target: targets::STORE, path = parent, ?value, "invalid array length");
                }
                valid.then_some(true)
            }
            Shape::Array => path::is_index(prop).then_some(true),
            Shape::Leaf => None,
        }
    }

    /// Delete the property at `path` and propagate the deletion.
    ///
    /// Bound `mark` elements are removed, and the path is purged from the
    /// dependency map so no computed stored there or reading it runs again.
    pub fn delete(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let (parent, prop) = path::split_last(path);
        let Some(parent_is_array) = self.inner.data.write().remove(parent, prop) else {
            tracing::debug!(target: targets::STORE, path, "delete ignored, parent does not resolve");
            return false;
        };
        tracing::trace!(target: targets::STORE, path, "delete");

        let owner = Owner::new(parent, parent_is_array);
        self.update(None, path, true, &owner, prop, None);
        self.inner.deps.lock().purge(path);
        true
    }

    // =========================================================================
    // Computed registration
    // =========================================================================

    fn register_computeds(&self, value: &Value, key: &str, owner: &Owner, prop: &str) {
        match value {
            Value::Computed(computed) => self.register_computed(Dependent {
                path: key.to_string(),
                computed: computed.clone(),
                owner: owner.clone(),
                prop: prop.to_string(),
            }),
            Value::Object(map) => {
                let child_owner = Owner::new(key, false);
                for (k, v) in map {
                    self.register_computeds(v, &path::join(key, k), &child_owner, k);
                }
            }
            Value::Array(items) => {
                let child_owner = Owner::new(key, true);
                for (i, item) in items.iter().enumerate() {
                    if let Some(v) = item {
                        let prop = i.to_string();
                        self.register_computeds(v, &path::join(key, &prop), &child_owner, &prop);
                    }
                }
            }
            _ => {}
        }
    }

    fn register_computed(&self, dependent: Dependent) {
        let guard = RecordingGuard::start(self);
        // Only the reads matter here. A pending result is dropped unpolled
        // and propagation runs the computed again for its value.
        let _ = self.run_computed(&dependent.computed);
        let captured = guard.finish();

        tracing::debug!(
            target: targets::DEPS,
            path = %dependent.path,
            deps = ?captured,
            "computed registered"
        );
        if captured.is_empty() {
            tracing::trace!(target: targets::DEPS, path = %dependent.path, "computed read no existing paths");
        }
        self.inner.deps.lock().subscribe(&captured, &dependent);
    }

    /// Paths that at least one computed depends on.
    pub fn dependency_paths(&self) -> Vec<String> {
        self.inner.deps.lock().paths()
    }

    /// Paths of the computeds subscribed to `path`.
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.inner.deps.lock().dependents_of(path)
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Call `watcher` whenever `path` or anything below it changes.
    ///
    /// For a change at `path` the watcher receives the new value; for a
    /// change below it, the current value at `path`. Watchers run before
    /// directives, and run even while directive dispatch is deferred.
    pub fn watch<F>(&self, path: &str, watcher: F) -> WatcherId
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.inner.watchers.lock().add(path, Arc::new(watcher))
    }

    /// Remove one watcher registered at `path`.
    pub fn unwatch(&self, path: &str, id: WatcherId) -> bool {
        self.inner.watchers.lock().remove(path, id)
    }

    /// Remove every watcher registered at `path`.
    pub fn unwatch_path(&self, path: &str) -> bool {
        self.inner.watchers.lock().remove_path(path)
    }

    /// Remove a watcher wherever it is registered.
    pub fn unwatch_id(&self, id: WatcherId) -> bool {
        self.inner.watchers.lock().remove_id(id)
    }

    /// Remove all watchers.
    pub fn unwatch_all(&self) {
        self.inner.watchers.lock().clear();
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    // =========================================================================
    // Directives
    // =========================================================================

    /// Register a directive bound through the attribute `prefix + name`.
    ///
    /// Parametric directives match attribute values of the form
    /// `path:argument`. Returns `false` if the name is already registered;
    /// the first registration wins.
    pub fn directive<F>(&self, name: &str, handler: F, parametric: bool) -> bool
    where
        F: Fn(&DirectiveParams<'_>) + Send + Sync + 'static,
    {
        let added = self
            .inner
            .directives
            .write()
            .register(name, Arc::new(handler), parametric);
        if added {
            tracing::debug!(target: targets::DIRECTIVE, name, parametric, "directive registered");
        } else {
            tracing::debug!(target: targets::DIRECTIVE, name, "directive already registered, keeping the first");
        }
        added
    }

    /// Names of the registered directives, in registration order.
    pub fn directive_names(&self) -> Vec<String> {
        self.inner.directives.read().names()
    }

    // =========================================================================
    // Document lifecycle
    // =========================================================================

    /// Apply every directive found on `node` and below it, using the current
    /// store values. Use after inserting markup that contains bindings.
    pub fn sync(&self, node: NodeId) {
        self.sync_node(node, false);
    }

    /// Mark the document interactive, register its templates as components
    /// and replay directive dispatch deferred during loading, in call order.
    pub fn document_ready(&self) {
        let doc = self.document();
        if !doc.ready_state().is_ready() {
            doc.set_ready_state(ReadyState::Interactive);
        }
        if let Err(err) = doc.register_templates() {
            tracing::warn!(target: targets::STORE, %err, "failed to register templates");
        }
        self.flush_deferred();
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Document::new(), TrellisConfig::default())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("prefix", &*self.inner.prefix.read())
            .field("nodes", &self.inner.data.read().slot_count())
            .field("document", &self.inner.document)
            .finish()
    }
}

/// Opens a recording on the current thread and closes it when finished or
/// dropped, so a panicking computed cannot leave recording switched on.
struct RecordingGuard<'a> {
    store: &'a Store,
    depth: Option<usize>,
}

impl<'a> RecordingGuard<'a> {
    fn start(store: &'a Store) -> Self {
        let depth = store.inner.recording.lock().start();
        Self {
            store,
            depth: Some(depth),
        }
    }

    fn finish(mut self) -> IndexSet<String> {
        match self.depth.take() {
            Some(depth) => self.store.inner.recording.lock().finish(depth),
            None => IndexSet::new(),
        }
    }
}

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        if let Some(depth) = self.depth.take() {
            self.store.inner.recording.lock().finish(depth);
        }
    }
}
