//! List materialization.
//!
//! An array at `list` renders through a placeholder element marked
//! `list.#`. The placeholder is moved into a `<template>` carrying the same
//! mark, and one clone per item is inserted before that template with every
//! directive key rewritten from `list.#...` to `list.<i>...`. Later index
//! writes replace or insert single clones; `length` writes restore index
//! order.

use horizon_trellis_dom::{DomError, DomResult, DomTree, NodeId};

use crate::data::Shape;
use crate::deps::Owner;
use crate::directive::{IF, IFNOT, MARK};
use crate::logging::{PerfSpan, targets};
use crate::path;
use crate::propagate::SyncConfig;
use crate::store::Store;
use crate::value::Value;

/// The value to dispatch for a binding key, and where it lives.
pub(crate) struct Binding {
    pub(crate) value: Option<Value>,
    pub(crate) owner: Owner,
    pub(crate) prop: String,
}

impl Store {
    /// Replace or insert the element for one array item.
    ///
    /// An existing element bound to `key` is replaced only when the item is
    /// an object or array; primitive items are updated in place by `mark`.
    pub(crate) fn update_array_item_element(&self, key: &str, idx: &str, item: Option<&Value>, owner: &Owner) {
        let mark_attr = self.attr(MARK);
        let doc = self.document();
        let existing = doc.query_attr_eq(&mark_attr, key);
        let is_container = item.is_some_and(Value::is_container);

        if !existing.is_empty() && !is_container {
            return;
        }
        if existing.is_empty() && item.is_none() {
            return;
        }

        let placeholder_key = path::to_placeholder(key);
        let mut replaced = false;
        for el in existing {
            let clone = doc.with_write(|tree| -> DomResult<Option<NodeId>> {
                let mut candidate = tree.next_element_sibling(el);
                while let Some(node) = candidate {
                    if tree.attribute(node, &mark_attr) == Some(placeholder_key.as_str()) {
                        break;
                    }
                    candidate = tree.next_element_sibling(node);
                }
                let Some(template) = candidate else {
                    return Ok(None);
                };
                let Some(source) = template_source(tree, template) else {
                    return Ok(None);
                };
                tree.clone_node(source, true).map(Some)
            });
            let clone = match clone {
                Ok(Some(clone)) => clone,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(target: targets::LIST, key, %err, "failed to clone list item");
                    continue;
                }
            };

            self.initialize_clone(idx, &owner.path, &placeholder_key, clone);
            let swapped = doc.with_write(|tree| {
                tree.replace_with(el, clone).inspect_err(|_| {
                    let _ = tree.remove(clone);
                })
            });
            if let Err(err) = swapped {
                tracing::debug!(target: targets::LIST, key, %err, "list item vanished before replacement");
                continue;
            }
            self.sync_clone(clone);
            replaced = true;
        }
        if replaced {
            return;
        }

        for template in doc.query_attr_eq(&mark_attr, &placeholder_key) {
            let clone = doc.with_write(|tree| -> DomResult<Option<NodeId>> {
                if !tree.is_template(template) {
                    return Ok(None);
                }
                let Some(source) = template_source(tree, template) else {
                    return Ok(None);
                };
                tree.clone_node(source, true).map(Some)
            });
            let clone = match clone {
                Ok(Some(clone)) => clone,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(target: targets::LIST, key, %err, "failed to clone list item");
                    continue;
                }
            };

            self.initialize_clone(idx, &owner.path, &placeholder_key, clone);
            let inserted = doc.with_write(|tree| {
                tree.insert_before(template, clone).inspect_err(|_| {
                    let _ = tree.remove(clone);
                })
            });
            if let Err(err) = inserted {
                tracing::warn!(target: targets::LIST, key, %err, "failed to insert list item");
                continue;
            }
            tracing::trace!(target: targets::LIST, key, "list item inserted");
            self.sync_clone(clone);
        }
    }

    /// Restore index order of the elements realized for an array.
    ///
    /// Walks backward from each list template over the sibling elements
    /// realized from it, and re-inserts them in ascending index order when
    /// they are out of order.
    pub(crate) fn sort_array_item_elements(&self, owner: &Owner) {
        let template_key = path::placeholder_of(&owner.path);
        let mark_attr = self.attr(MARK);
        let doc = self.document();

        for template in doc.query_attr_eq(&mark_attr, &template_key) {
            let result = doc.with_write(|tree| -> DomResult<bool> {
                let mut items = Vec::new();
                let mut sorted = true;
                let mut last_idx: Option<usize> = None;

                let mut prev = tree.previous_element_sibling(template);
                while let Some(curr) = prev {
                    prev = tree.previous_element_sibling(curr);
                    let Some(key) = tree.attribute(curr, &mark_attr).filter(|k| !k.is_empty()) else {
                        continue;
                    };
                    if key == template_key {
                        break;
                    }
                    if path::to_placeholder(key) != template_key {
                        continue;
                    }
                    items.push(curr);
                    if !sorted {
                        continue;
                    }
                    let idx = path::trailing_index(key).unwrap_or(0);
                    if last_idx.is_some_and(|last| last != idx + 1) {
                        sorted = false;
                    }
                    last_idx = Some(idx);
                }

                if sorted {
                    return Ok(false);
                }
                items.sort_by_key(|&el| {
                    tree.attribute(el, &mark_attr)
                        .and_then(path::trailing_index)
                        .unwrap_or(0)
                });
                for el in items {
                    tree.insert_before(template, el)?;
                }
                Ok(true)
            });
            match result {
                Ok(true) => tracing::trace!(target: targets::LIST, list = %owner.path, "list items reordered"),
                Ok(false) => {}
                Err(err) => tracing::warn!(target: targets::LIST, list = %owner.path, %err, "failed to reorder list items"),
            }
        }
    }

    /// Realize one element per array item from the placeholder `plc`.
    ///
    /// Elements realized earlier are removed first. The returned vector is
    /// aligned with `items`; holes and failed clones are `None`.
    pub(crate) fn initialize_array_elements(
        &self,
        plc: NodeId,
        placeholder_key: &str,
        items: &[Option<Value>],
    ) -> Vec<Option<NodeId>> {
        let _span = PerfSpan::new("list.initialize");
        let mark_attr = self.attr(MARK);
        let doc = self.document();

        doc.with_write(|tree| {
            let mut prev = tree.previous_element_sibling(plc);
            while let Some(curr) = prev {
                prev = tree.previous_element_sibling(curr);
                let Some(key) = tree.attribute(curr, &mark_attr).filter(|k| !k.is_empty()) else {
                    continue;
                };
                if key == placeholder_key || path::to_placeholder(key) != placeholder_key {
                    break;
                }
                let _ = tree.remove(curr);
            }
        });

        let setup = doc.with_write(|tree| -> DomResult<Option<(NodeId, NodeId)>> {
            if tree.is_template(plc) {
                let Some(placeholder) = template_source(tree, plc) else {
                    return Ok(None);
                };
                tree.set_attribute(placeholder, &mark_attr, placeholder_key)?;
                return Ok(Some((plc, placeholder)));
            }
            let template = tree.create_element("template");
            let content = tree.template_content(template).ok_or(DomError::NotAnElement)?;
            let placeholder = tree.clone_node(plc, true)?;
            tree.append_child(content, placeholder)?;
            tree.set_attribute(template, &mark_attr, placeholder_key)?;
            tree.replace_with(plc, template)?;
            Ok(Some((template, placeholder)))
        });
        let (template, placeholder) = match setup {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                tracing::warn!(target: targets::LIST, placeholder_key, "empty template found for list");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(target: targets::LIST, placeholder_key, %err, "failed to prepare list template");
                return Vec::new();
            }
        };

        let prefix = path::strip_placeholder(placeholder_key);
        let mut realized = vec![None; items.len()];
        for (i, item) in items.iter().enumerate() {
            if item.is_none() {
                continue;
            }
            let idx = i.to_string();
            let clone = doc.with_write(|tree| tree.clone_node(placeholder, true));
            let clone = match clone {
                Ok(clone) => clone,
                Err(err) => {
                    tracing::warn!(target: targets::LIST, placeholder_key, %err, "failed to clone list item");
                    continue;
                }
            };
            self.initialize_clone(&idx, prefix, placeholder_key, clone);
            if let Err(err) = doc.with_write(|tree| tree.insert_before(template, clone)) {
                tracing::warn!(target: targets::LIST, placeholder_key, %err, "failed to insert list item");
                continue;
            }
            self.sync_clone(clone);
            realized[i] = Some(clone);
        }
        tracing::debug!(target: targets::LIST, placeholder_key, count = items.len(), "list realized");
        realized
    }

    /// Rewrite every directive key starting with `placeholder_key` inside a
    /// fresh clone to address item `idx`. Nested template content is
    /// rewritten too, so concealed and nested-list markup keeps its item.
    pub(crate) fn initialize_clone(&self, idx: &str, prefix: &str, placeholder_key: &str, clone: NodeId) {
        let key = path::join(prefix, idx);
        let attrs: Vec<String> = self
            .directive_names()
            .iter()
            .map(|name| self.attr(name))
            .collect();

        self.document().with_write(|tree| {
            for node in subtree_with_templates(tree, clone) {
                for attr in &attrs {
                    let Some(value) = tree.attribute(node, attr) else {
                        continue;
                    };
                    let Some(rest) = value.strip_prefix(placeholder_key) else {
                        continue;
                    };
                    let rewritten = format!("{key}{rest}");
                    let _ = tree.set_attribute(node, attr, &rewritten);
                }
            }
        });
    }

    /// Apply current store values to every directive on `el` and below it.
    pub(crate) fn sync_node(&self, el: NodeId, is_root: bool) {
        for child in self.document().element_children(el) {
            self.sync_node(child, false);
        }
        self.sync_directives(el, is_root, false);
    }

    /// Like [`sync_node`](Self::sync_node) for a fresh list clone: `mark` is
    /// skipped since the list dispatch renders it.
    pub(crate) fn sync_clone(&self, el: NodeId) {
        for child in self.document().element_children(el) {
            self.sync_clone(child);
        }
        self.sync_directives(el, false, true);
    }

    fn sync_directives(&self, el: NodeId, skip_conditionals: bool, skip_mark: bool) {
        let doc = self.document();
        for (name, directive) in self.inner.directives.read().snapshot() {
            if (skip_mark && name == MARK) || (skip_conditionals && (name == IF || name == IFNOT)) {
                continue;
            }
            let Some(mut key) = doc.attribute(el, &self.attr(&name)) else {
                continue;
            };
            if directive.parametric {
                if let Some((bound, _)) = key.split_once(':') {
                    key = bound.to_string();
                }
            }
            let key = path::strip_placeholder(&key).to_string();
            if key.is_empty() {
                continue;
            }

            let binding = self.binding_target(&key);
            self.update(
                binding.value,
                &key,
                false,
                &binding.owner,
                &binding.prop,
                Some(&SyncConfig {
                    directive: name,
                    el,
                    skip_conditionals,
                    skip_mark,
                }),
            );
        }
    }

    /// Walk `key` down the data tree. The walk stops at the last segment or
    /// at the first value that is not a container; the value there is the
    /// binding's value.
    pub(crate) fn binding_target(&self, key: &str) -> Binding {
        let data = self.inner.data.read();
        let mut owner = Owner::root();
        let mut prop = String::new();
        let mut segments = path::segments(key).peekable();
        while let Some(segment) = segments.next() {
            prop = segment.to_string();
            if segments.peek().is_none() {
                break;
            }
            let child = path::join(&owner.path, segment);
            match data.shape(&child) {
                Some(Shape::Object) => owner = Owner::new(child, false),
                Some(Shape::Array) => owner = Owner::new(child, true),
                _ => break,
            }
        }
        let value = data.read(&path::join(&owner.path, &prop));
        Binding { value, owner, prop }
    }
}

/// First element of a template's content.
fn template_source(tree: &DomTree, template: NodeId) -> Option<NodeId> {
    tree.template_content(template)
        .and_then(|content| tree.first_element_child(content))
}

/// `root` and all nodes below it, descending into template content.
fn subtree_with_templates(tree: &DomTree, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(tree.children(node).iter().rev().copied());
        if let Some(content) = tree.template_content(node) {
            stack.extend(tree.children(content).iter().rev().copied());
        }
    }
    out
}
