//! Directives: named handlers bound to elements through attributes.
//!
//! A directive named `name` binds every element carrying the attribute
//! `prefix + name` whose value is a path. Parametric directives take a
//! `path:argument` value and receive the argument as
//! [`DirectiveParams::param`]. No binding index is kept; matching elements
//! are found by attribute query each time a path changes.
//!
//! Three directives are built in:
//!
//! - `mark` renders the value as the element's text, and removes the element
//!   when the path is deleted.
//! - `if` shows the element while the value is truthy.
//! - `ifnot` shows the element while the value is falsy.

use std::sync::Arc;

use horizon_trellis_dom::{DomError, DomResult, NodeId};
use indexmap::IndexMap;

use crate::deps::Owner;
use crate::logging::targets;
use crate::store::Store;
use crate::value::{Value, text_of, truthy};

/// Name of the text directive.
pub const MARK: &str = "mark";
/// Name of the "show while truthy" directive.
pub const IF: &str = "if";
/// Name of the "show while falsy" directive.
pub const IFNOT: &str = "ifnot";

/// Arguments passed to a directive handler.
#[derive(Debug)]
pub struct DirectiveParams<'a> {
    /// The store that dispatched the change.
    pub store: &'a Store,
    /// The bound element.
    pub el: NodeId,
    /// The new value (`None` when deleted or undefined).
    pub value: Option<&'a Value>,
    /// Path of the value.
    pub key: &'a str,
    /// Whether the value was deleted.
    pub is_delete: bool,
    /// The container owning the value.
    pub parent: &'a Owner,
    /// Property of the owner holding the value.
    pub prop: &'a str,
    /// Argument of a parametric binding.
    pub param: Option<&'a str>,
}

/// A directive handler.
pub type DirectiveHandler = Arc<dyn Fn(&DirectiveParams<'_>) + Send + Sync>;

/// A registered directive.
#[derive(Clone)]
pub(crate) struct Directive {
    pub(crate) handler: DirectiveHandler,
    pub(crate) parametric: bool,
}

/// Registered directives in registration order.
pub(crate) struct DirectiveRegistry {
    entries: IndexMap<String, Directive>,
}

impl DirectiveRegistry {
    /// A registry holding the built-in directives.
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Self {
            entries: IndexMap::new(),
        };
        registry.register(MARK, Arc::new(mark), false);
        registry.register(IF, Arc::new(|p: &DirectiveParams<'_>| conditional(p, IF)), false);
        registry.register(IFNOT, Arc::new(|p: &DirectiveParams<'_>| conditional(p, IFNOT)), false);
        registry
    }

    /// Register a directive. The first registration of a name wins.
    pub(crate) fn register(&mut self, name: &str, handler: DirectiveHandler, parametric: bool) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), Directive { handler, parametric });
        true
    }

    pub(crate) fn get(&self, name: &str) -> Option<Directive> {
        self.entries.get(name).cloned()
    }

    /// Snapshot of all directives, so handlers run without the registry lock.
    pub(crate) fn snapshot(&self) -> Vec<(String, Directive)> {
        self.entries
            .iter()
            .map(|(name, d)| (name.clone(), d.clone()))
            .collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// The argument of a parametric binding: everything after the first `:`.
pub(crate) fn param_of(attr_value: Option<&str>, parametric: bool) -> Option<String> {
    if !parametric {
        return None;
    }
    let value = attr_value.filter(|v| !v.is_empty())?;
    Some(match value.split_once(':') {
        Some((_, param)) => param.to_string(),
        None => value.to_string(),
    })
}

// =============================================================================
// Built-in directives
// =============================================================================

fn mark(p: &DirectiveParams<'_>) {
    if p.is_delete {
        remove_bound(p.store, p.el);
        return;
    }

    let text = text_of(p.value);
    let result = p.store.document().with_write(|tree| {
        if !tree.is_element(p.el) || tree.is_template(p.el) {
            return Ok(());
        }
        tree.set_text(p.el, &text)
    });
    if let Err(err) = result {
        tracing::debug!(target: targets::DIRECTIVE, key = p.key, %err, "mark target vanished");
    }
}

/// Remove a bound element, or its parent when both carry the same mark key.
fn remove_bound(store: &Store, el: NodeId) {
    let mark_attr = store.attr(MARK);
    let result = store.document().with_write(|tree| {
        let target = match tree.parent_element(el) {
            Some(parent) if tree.attribute(el, &mark_attr) == tree.attribute(parent, &mark_attr) => parent,
            _ => el,
        };
        tree.remove(target)
    });
    if let Err(err) = result {
        tracing::debug!(target: targets::DIRECTIVE, %err, "element already removed");
    }
}

fn conditional(p: &DirectiveParams<'_>, kind: &str) {
    let show = if kind == IF { truthy(p.value) } else { !truthy(p.value) };
    let doc = p.store.document();
    let is_template = doc.with_read(|tree| tree.is_template(p.el));

    let result = if show && is_template {
        reveal(p, kind)
    } else if !show && !is_template {
        conceal(p, kind)
    } else {
        Ok(())
    };
    if let Err(err) = result {
        tracing::warn!(target: targets::DIRECTIVE, key = p.key, kind, %err, "conditional toggle failed");
    }
}

/// Replace a concealing template with its first element, synced first so
/// bindings that were hidden inside it come alive.
fn reveal(p: &DirectiveParams<'_>, kind: &str) -> DomResult<()> {
    let attr = p.store.attr(kind);
    let doc = p.store.document();
    let child = doc.with_write(|tree| -> DomResult<Option<NodeId>> {
        let Some(child) = tree
            .template_content(p.el)
            .and_then(|content| tree.first_element_child(content))
        else {
            return Ok(None);
        };
        tree.set_attribute(child, &attr, p.key)?;
        Ok(Some(child))
    })?;
    let Some(child) = child else {
        return Ok(());
    };

    p.store.sync_node(child, true);
    doc.with_write(|tree| tree.replace_with(p.el, child))
}

/// Replace a live element with a template holding a copy of it.
fn conceal(p: &DirectiveParams<'_>, kind: &str) -> DomResult<()> {
    let attr = p.store.attr(kind);
    let mark_attr = p.store.attr(MARK);
    p.store.document().with_write(|tree| {
        if tree.parent(p.el).is_none() {
            return Ok(());
        }
        let template = tree.create_element("template");
        let content = tree.template_content(template).ok_or(DomError::NotAnElement)?;
        let copy = tree.clone_node(p.el, true)?;
        tree.append_child(content, copy)?;
        tree.set_attribute(template, &attr, p.key)?;
        if let Some(mark) = tree.attribute(p.el, &mark_attr).map(str::to_string) {
            tree.set_attribute(template, &mark_attr, &mark)?;
        }
        tree.replace_with(p.el, template)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let mut registry = DirectiveRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["mark", "if", "ifnot"]);

        assert!(!registry.register(MARK, Arc::new(|_: &DirectiveParams<'_>| {}), true));
        assert!(!registry.get(MARK).unwrap().parametric);

        assert!(registry.register("style", Arc::new(|_: &DirectiveParams<'_>| {}), true));
        assert!(registry.get("style").unwrap().parametric);
        assert_eq!(registry.snapshot().len(), 4);
    }

    #[test]
    fn test_param_of() {
        assert_eq!(param_of(Some("color:red"), true).as_deref(), Some("red"));
        assert_eq!(param_of(Some("a:b:c"), true).as_deref(), Some("b:c"));
        assert_eq!(param_of(Some("color:red"), false), None);
        assert_eq!(param_of(Some(""), true), None);
        assert_eq!(param_of(None, true), None);
    }
}
