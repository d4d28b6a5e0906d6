//! Template-based components.
//!
//! A `<template name="tag-name">` element defines a component. Once defined,
//! every connected element with that tag receives a shadow root holding
//! clones of the document's `<style>` and `<link rel="stylesheet">` elements
//! followed by a clone of the template content. Shadow roots are parentless
//! fragments, so attribute queries against the document never see inside a
//! component instance.

use indexmap::IndexMap;

use crate::error::DomResult;
use crate::node::NodeId;
use crate::tree::DomTree;

/// Registered component definitions, keyed by lowercase tag name.
#[derive(Debug, Default)]
pub(crate) struct ComponentRegistry {
    /// Each definition is a detached fragment holding a copy of the template
    /// content taken at registration time.
    definitions: IndexMap<String, NodeId>,
}

impl ComponentRegistry {
    pub(crate) fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Custom element names must contain a hyphen and start with a lowercase letter.
pub fn is_valid_component_name(name: &str) -> bool {
    name.contains('-')
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.')
}

impl DomTree {
    /// Whether a component is defined for the tag name.
    pub fn is_component_defined(&self, name: &str) -> bool {
        self.components
            .definitions
            .contains_key(&name.to_ascii_lowercase())
    }

    /// Names of all defined components, in definition order.
    pub fn component_names(&self) -> Vec<String> {
        self.components.definitions.keys().cloned().collect()
    }

    /// Define a component from a `<template>` element.
    ///
    /// Returns `false` when the name is already defined (the first definition
    /// wins) or is not a valid custom element name.
    pub fn define_component(&mut self, name: &str, template: NodeId) -> DomResult<bool> {
        let name = name.to_ascii_lowercase();
        if self.components.definitions.contains_key(&name) {
            return Ok(false);
        }
        if !is_valid_component_name(&name) {
            tracing::warn!(target: "horizon_trellis_dom::component", %name, "invalid component name, skipping");
            return Ok(false);
        }

        let definition = match self.template_content(template) {
            Some(content) => self.clone_node(content, true)?,
            None => self.create_fragment(),
        };
        tracing::debug!(target: "horizon_trellis_dom::component", %name, "component defined");
        self.components.definitions.insert(name, definition);

        let root = self.root();
        self.upgrade_subtree(root);
        Ok(true)
    }

    /// Register every named `<template>` below `root` (the whole document when
    /// `None`). Returns the names that were newly defined.
    pub fn register_templates(&mut self, root: Option<NodeId>) -> DomResult<Vec<String>> {
        let root = root.unwrap_or_else(|| self.root());
        let mut defined = Vec::new();
        for template in self.elements_by_tag(root, "template") {
            let Some(name) = self.attribute(template, "name").map(str::to_string) else {
                continue;
            };
            if self.define_component(&name, template)? {
                defined.push(name.to_ascii_lowercase());
            }
        }
        Ok(defined)
    }

    /// Parse markup into a detached container and register the templates it
    /// defines.
    pub fn register_html(&mut self, markup: &str) -> DomResult<Vec<String>> {
        let holder = self.create_element("div");
        let nodes = self.parse_fragment(markup)?;
        for node in nodes {
            self.append_child(holder, node)?;
        }
        let defined = self.register_templates(Some(holder));
        self.remove(holder)?;
        defined
    }

    /// Attach shadow roots to every connected, not yet upgraded component
    /// element at or below `root`.
    pub(crate) fn upgrade_subtree(&mut self, root: NodeId) {
        if self.components.is_empty() || !self.is_connected(root) {
            return;
        }

        let mut candidates = vec![root];
        candidates.extend(self.descendants(root));
        for node in candidates {
            let Some(tag) = self.tag_name(node).map(str::to_string) else {
                continue;
            };
            if self.shadow_root(node).is_some() {
                continue;
            }
            let Some(&definition) = self.components.definitions.get(&tag) else {
                continue;
            };
            if let Err(err) = self.attach_shadow(node, definition) {
                tracing::warn!(target: "horizon_trellis_dom::component", %tag, %err, "failed to upgrade component");
            }
        }
    }

    fn attach_shadow(&mut self, host: NodeId, definition: NodeId) -> DomResult<()> {
        let shadow = self.create_fragment();
        let doc = self.root();

        let mut shared_styles = self.elements_by_tag(doc, "style");
        shared_styles.extend(
            self.elements_by_tag(doc, "link")
                .into_iter()
                .filter(|&l| self.attribute(l, "rel") == Some("stylesheet")),
        );
        for style in shared_styles {
            let copy = self.clone_node(style, true)?;
            self.append_child(shadow, copy)?;
        }

        for child in self.children(definition).to_vec() {
            let copy = self.clone_node(child, true)?;
            self.append_child(shadow, copy)?;
        }

        self.set_shadow_root(host, shadow)?;
        tracing::trace!(target: "horizon_trellis_dom::component", ?host, "component upgraded");
        Ok(())
    }
}
