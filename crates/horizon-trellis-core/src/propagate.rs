//! Change propagation.
//!
//! A change at a path runs, in order: the watchers registered at that path
//! or above it, then the directives bound to it (fanning out into the
//! children of objects and arrays), and finally the computed values that
//! depend on it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::Ordering;

use horizon_trellis_dom::NodeId;

use crate::deps::Owner;
use crate::directive::{Directive, DirectiveParams, MARK, param_of};
use crate::logging::targets;
use crate::path;
use crate::store::Store;
use crate::value::{Computation, Value};
use crate::watch::{Matched, Watcher};

/// Restricts a dispatch to one directive on one element. Used when syncing
/// freshly revealed or cloned markup.
#[derive(Debug, Clone)]
pub(crate) struct SyncConfig {
    pub(crate) directive: String,
    pub(crate) el: NodeId,
    pub(crate) skip_conditionals: bool,
    pub(crate) skip_mark: bool,
}

/// A directive dispatch queued while the document is loading.
#[derive(Debug)]
pub(crate) struct Dispatch {
    value: Option<Value>,
    key: String,
    is_delete: bool,
    owner: Owner,
    prop: String,
    sync: Option<SyncConfig>,
}

impl Store {
    /// Propagate a new value (or a deletion) at `key`.
    ///
    /// A computed value is run first; if its result is pending, propagation
    /// resumes when it settles.
    pub(crate) fn update(
        &self,
        value: Option<Value>,
        key: &str,
        is_delete: bool,
        owner: &Owner,
        prop: &str,
        sync: Option<&SyncConfig>,
    ) {
        let value = match value {
            Some(Value::Computed(computed)) => match self.run_computed(&computed) {
                Computation::Ready(result) => result,
                Computation::Pending(future) => {
                    self.enqueue_update(future, key, owner, prop, sync.cloned());
                    return;
                }
            },
            other => other,
        };

        if sync.is_none() {
            self.call_watchers(value.as_ref(), key);
        }
        self.dispatch(value, key, is_delete, owner, prop, sync);
    }

    /// Re-run every computed depending on `key`.
    pub(crate) fn update_computed(&self, key: &str) {
        let affected = self.inner.deps.lock().affected_by(key);
        for dependent in affected {
            tracing::trace!(target: targets::DEPS, changed = key, path = %dependent.path, "re-running computed");
            self.update(
                Some(Value::Computed(dependent.computed)),
                &dependent.path,
                false,
                &dependent.owner,
                &dependent.prop,
                None,
            );
        }
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    fn call_watchers(&self, value: Option<&Value>, key: &str) {
        let matched = self.inner.watchers.lock().matching(key);
        if matched.is_empty() {
            return;
        }

        let mut resolved: Option<Option<Value>> = None;
        for group in matched {
            match group {
                Matched::Exact(watchers) => {
                    let value = resolved.get_or_insert_with(|| value.cloned().and_then(|v| self.resolve(v)));
                    for watcher in &watchers {
                        invoke_watcher(watcher, value.as_ref(), key);
                    }
                }
                Matched::Ancestor(watched, watchers) => {
                    let current = self.get(&watched);
                    for watcher in &watchers {
                        invoke_watcher(watcher, current.as_ref(), &watched);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Directives
    // =========================================================================

    fn dispatch(
        &self,
        value: Option<Value>,
        key: &str,
        is_delete: bool,
        owner: &Owner,
        prop: &str,
        sync: Option<&SyncConfig>,
    ) {
        if self.should_defer() {
            tracing::trace!(target: targets::PROPAGATE, key, "document loading, dispatch deferred");
            self.inner.deferred.lock().push_back(Dispatch {
                value,
                key: key.to_string(),
                is_delete,
                owner: owner.clone(),
                prop: prop.to_string(),
                sync: sync.cloned(),
            });
            return;
        }

        self.flush_deferred();
        self.call_directives(value.as_ref(), key, is_delete, owner, prop, None, false, sync);
    }

    fn should_defer(&self) -> bool {
        self.inner.config.defer_until_ready && !self.inner.document.ready_state().is_ready()
    }

    /// Replay queued dispatches in the order they were made.
    pub(crate) fn flush_deferred(&self) {
        if self.should_defer() || self.inner.flushing.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut replayed = 0usize;
        loop {
            let next = self.inner.deferred.lock().pop_front();
            let Some(d) = next else {
                break;
            };
            self.call_directives(d.value.as_ref(), &d.key, d.is_delete, &d.owner, &d.prop, None, false, d.sync.as_ref());
            replayed += 1;
        }
        self.inner.flushing.store(false, Ordering::Release);
        if replayed > 0 {
            tracing::debug!(target: targets::PROPAGATE, replayed, "deferred dispatches replayed");
        }
    }

    /// Number of directive dispatches waiting for the document to be ready.
    pub fn deferred_count(&self) -> usize {
        self.inner.deferred.lock().len()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_directives(
        &self,
        value: Option<&Value>,
        key: &str,
        is_delete: bool,
        owner: &Owner,
        prop: &str,
        search_root: Option<NodeId>,
        skip_array_update: bool,
        sync: Option<&SyncConfig>,
    ) {
        let skip_mark = sync.is_some_and(|s| s.skip_mark);

        if owner.is_array && path::is_index(prop) && !skip_array_update && !skip_mark {
            self.update_array_item_element(key, prop, value, owner);
        } else if owner.is_array && prop == "length" {
            self.sort_array_item_elements(owner);
        }

        match value {
            Some(Value::Array(items)) if !skip_mark => {
                self.render_list(key, items, is_delete, sync);
                return;
            }
            Some(container @ (Value::Array(_) | Value::Object(_))) => {
                self.fan_out(container, key, is_delete, search_root);
                return;
            }
            _ => {}
        }

        if let Some(sync) = sync {
            let Some(directive) = self.inner.directives.read().get(&sync.directive) else {
                return;
            };
            let attr = self.attr(&sync.directive);
            let param = param_of(self.document().attribute(sync.el, &attr).as_deref(), directive.parametric);
            self.invoke_directive(
                &sync.directive,
                &directive,
                &DirectiveParams {
                    store: self,
                    el: sync.el,
                    value,
                    key,
                    is_delete,
                    parent: owner,
                    prop,
                    param: param.as_deref(),
                },
            );
            return;
        }

        let doc = self.document();
        let root = search_root.unwrap_or_else(|| doc.root());
        let directives = self.inner.directives.read().snapshot();
        for (name, directive) in directives {
            let attr = self.attr(&name);
            let bound = doc.with_read(|tree| {
                if directive.parametric {
                    tree.query_attr_prefix(root, &attr, &format!("{key}:"))
                } else {
                    tree.query_attr_eq(root, &attr, key)
                }
            });
            for el in bound {
                self.invoke_bound(&name, &directive, &attr, el, value, key, is_delete, owner, prop);
            }

            // Queries exclude their root, so a scoped root is matched by hand.
            if search_root.is_some() && self.binds(root, &attr, key, directive.parametric) {
                self.invoke_bound(&name, &directive, &attr, root, value, key, is_delete, owner, prop);
            }
        }
    }

    /// Whether `el` carries `attr` bound to `key`, with the same rule the
    /// attribute query applies.
    fn binds(&self, el: NodeId, attr: &str, key: &str, parametric: bool) -> bool {
        self.document().with_read(|tree| {
            tree.is_element(el)
                && tree.attribute(el, attr).is_some_and(|v| {
                    if parametric {
                        v.split_once(':').is_some_and(|(bound, _)| bound == key)
                    } else {
                        v == key
                    }
                })
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke_bound(
        &self,
        name: &str,
        directive: &Directive,
        attr: &str,
        el: NodeId,
        value: Option<&Value>,
        key: &str,
        is_delete: bool,
        owner: &Owner,
        prop: &str,
    ) {
        let param = param_of(self.document().attribute(el, attr).as_deref(), directive.parametric);
        self.invoke_directive(
            name,
            directive,
            &DirectiveParams {
                store: self,
                el,
                value,
                key,
                is_delete,
                parent: owner,
                prop,
                param: param.as_deref(),
            },
        );
    }

    fn invoke_directive(&self, name: &str, directive: &Directive, params: &DirectiveParams<'_>) {
        tracing::trace!(target: targets::DIRECTIVE, name, key = params.key, el = params.el.as_raw(), "invoking directive");
        if catch_unwind(AssertUnwindSafe(|| (directive.handler)(params))).is_err() {
            tracing::error!(target: targets::DIRECTIVE, name, key = params.key, "directive handler panicked");
        }
    }

    /// Dispatch each child of an object or array to the elements bound to
    /// its own path.
    fn fan_out(&self, container: &Value, key: &str, is_delete: bool, search_root: Option<NodeId>) {
        match container {
            Value::Object(map) => {
                let owner = Owner::new(key, false);
                for (prop, child) in map {
                    self.call_child(child, &path::join(key, prop), is_delete, &owner, prop, search_root, false);
                }
            }
            Value::Array(items) => {
                let owner = Owner::new(key, true);
                for (i, child) in items.iter().enumerate() {
                    if let Some(child) = child {
                        let prop = i.to_string();
                        self.call_child(child, &path::join(key, &prop), is_delete, &owner, &prop, search_root, false);
                    }
                }
            }
            _ => {}
        }
    }

    /// Render an array through its list placeholders, then dispatch each item
    /// inside the element realized for it.
    fn render_list(&self, key: &str, items: &[Option<Value>], is_delete: bool, sync: Option<&SyncConfig>) {
        let placeholder_key = path::placeholder_of(key);
        let mark_attr = self.attr(MARK);
        let doc = self.document();

        let placeholders = doc.with_read(|tree| {
            let target = sync
                .and_then(|s| tree.parent_element(s.el))
                .unwrap_or_else(|| tree.root());
            tree.query_attr_eq(target, &mark_attr, &placeholder_key)
        });
        if placeholders.is_empty() && !doc.query_attr_eq(&mark_attr, key).is_empty() {
            tracing::warn!(
                target: targets::LIST,
                key,
                "array bound to an element with no `{placeholder_key}` placeholder; nothing rendered"
            );
        }

        let realized: Vec<Vec<Option<NodeId>>> = placeholders
            .into_iter()
            .map(|placeholder| self.initialize_array_elements(placeholder, &placeholder_key, items))
            .collect();

        let owner = Owner::new(key, true);
        for elements in realized {
            for (i, item) in items.iter().enumerate() {
                let Some(item) = item else {
                    continue;
                };
                let root = elements.get(i).copied().flatten();
                let prop = i.to_string();
                self.call_child(item, &path::join(key, &prop), is_delete, &owner, &prop, root, true);
            }
        }
    }

    /// Dispatch one child value, running it first if it is computed.
    #[allow(clippy::too_many_arguments)]
    fn call_child(
        &self,
        child: &Value,
        key: &str,
        is_delete: bool,
        owner: &Owner,
        prop: &str,
        search_root: Option<NodeId>,
        skip_array_update: bool,
    ) {
        let Value::Computed(computed) = child else {
            self.call_directives(Some(child), key, is_delete, owner, prop, search_root, skip_array_update, None);
            return;
        };
        match self.run_computed(computed) {
            Computation::Ready(result) => {
                self.call_directives(result.as_ref(), key, is_delete, owner, prop, search_root, skip_array_update, None);
            }
            Computation::Pending(future) => self.enqueue_update(future, key, owner, prop, None),
        }
    }
}

fn invoke_watcher(watcher: &Watcher, value: Option<&Value>, key: &str) {
    if catch_unwind(AssertUnwindSafe(|| watcher(value))).is_err() {
        tracing::error!(target: targets::PROPAGATE, key, "watcher panicked");
    }
}
