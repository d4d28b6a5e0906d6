//! Arena-backed document tree.
//!
//! [`DomTree`] stores every node in a [`SlotMap`] and keeps parent/child
//! links as ids, the same layout the object registry of an object tree uses.
//! Template content and shadow roots are parentless fragments owned by their
//! host element; tree walks and attribute queries never descend into them,
//! which is what keeps concealed bindings undiscoverable until they are
//! revealed.

use slotmap::SlotMap;

use crate::component::ComponentRegistry;
use crate::error::{DomError, DomResult};
use crate::node::{ElementData, NodeData, NodeId, NodeKind, ReadyState};

/// A mutable document tree.
pub struct DomTree {
    nodes: SlotMap<NodeId, NodeData>,
    root: NodeId,
    ready_state: ReadyState,
    pub(crate) components: ComponentRegistry,
}

impl DomTree {
    /// Create an empty document.
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(NodeData::new(NodeKind::Document));
        Self {
            nodes,
            root,
            ready_state: ReadyState::default(),
            components: ComponentRegistry::default(),
        }
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The first `<body>` element, or the document node when there is none.
    pub fn body(&self) -> NodeId {
        self.elements_by_tag(self.root, "body")
            .into_iter()
            .next()
            .unwrap_or(self.root)
    }

    /// Current loading state.
    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Update the loading state.
    pub fn set_ready_state(&mut self, state: ReadyState) {
        tracing::debug!(target: "horizon_trellis_dom::tree", ?state, "ready state changed");
        self.ready_state = state;
    }

    /// Number of live nodes, including detached ones and the document node.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a detached element. `<template>` elements get an empty content
    /// fragment.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let mut data = ElementData::new(tag);
        if data.is_template() {
            data.template_content = Some(self.create_fragment());
        }
        self.nodes.insert(NodeData::new(NodeKind::Element(data)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.nodes.insert(NodeData::new(NodeKind::Text(text.into())))
    }

    /// Create a detached comment node.
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.nodes.insert(NodeData::new(NodeKind::Comment(text.into())))
    }

    /// Create an empty fragment.
    pub fn create_fragment(&mut self) -> NodeId {
        self.nodes.insert(NodeData::new(NodeKind::Fragment))
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Whether the id refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The kind and payload of a node.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|n| &n.kind)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id).and_then(|n| n.kind.as_element())
    }

    fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        self.nodes
            .get_mut(id)
            .ok_or(DomError::InvalidNode)?
            .kind
            .as_element_mut()
            .ok_or(DomError::NotAnElement)
    }

    /// Whether the node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Whether the node is a `<template>` element.
    pub fn is_template(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(ElementData::is_template)
    }

    /// Lowercase tag name of an element.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag)
    }

    /// Attribute value of an element.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    /// Whether an element carries the attribute.
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// All attributes of an element, in insertion order.
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map(ElementData::attributes).unwrap_or(&[])
    }

    /// Set (or overwrite) an attribute.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.element_mut(id)?.set_attribute(name, value);
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> DomResult<Option<String>> {
        Ok(self.element_mut(id)?.remove_attribute(name))
    }

    /// Content fragment of a `<template>` element.
    pub fn template_content(&self, id: NodeId) -> Option<NodeId> {
        self.element(id).and_then(|e| e.template_content)
    }

    /// Shadow root of an upgraded component element.
    pub fn shadow_root(&self, id: NodeId) -> Option<NodeId> {
        self.element(id).and_then(|e| e.shadow_root)
    }

    pub(crate) fn set_shadow_root(&mut self, id: NodeId, fragment: NodeId) -> DomResult<()> {
        self.element_mut(id)?.shadow_root = Some(fragment);
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Parent node (element, fragment or document).
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Parent node, only if it is an element.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    /// Child nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Child elements.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// First child element.
    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.is_element(c))
    }

    fn sibling_position(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let pos = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, pos))
    }

    /// Next sibling that is an element.
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, pos) = self.sibling_position(id)?;
        self.children(parent)[pos + 1..]
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    /// Previous sibling that is an element.
    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, pos) = self.sibling_position(id)?;
        self.children(parent)[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&c| self.is_element(c))
    }

    /// Whether the node is attached to the document.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn check_insertable(&self, parent: NodeId, node: NodeId) -> DomResult<()> {
        if !self.contains(parent) || !self.contains(node) {
            return Err(DomError::InvalidNode);
        }
        if matches!(self.kind(node), Some(NodeKind::Document)) {
            return Err(DomError::HierarchyRequest("the document node cannot be inserted"));
        }
        if self.is_inclusive_ancestor(node, parent) {
            return Err(DomError::HierarchyRequest("a node cannot be inserted into itself"));
        }
        Ok(())
    }

    /// Detach a node from its parent, keeping it alive.
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let parent = self.nodes.get(id).ok_or(DomError::InvalidNode)?.parent;
        if let Some(parent) = parent {
            if let Some(parent_data) = self.nodes.get_mut(parent) {
                parent_data.children.retain(|&c| c != id);
            }
        }
        if let Some(data) = self.nodes.get_mut(id) {
            data.parent = None;
        }
        Ok(())
    }

    /// Nodes to actually insert: a fragment contributes its children.
    fn take_insertables(&mut self, node: NodeId) -> DomResult<Vec<NodeId>> {
        if matches!(self.kind(node), Some(NodeKind::Fragment)) {
            let children = std::mem::take(&mut self.nodes[node].children);
            for &child in &children {
                self.nodes[child].parent = None;
            }
            Ok(children)
        } else {
            self.detach(node)?;
            Ok(vec![node])
        }
    }

    fn insert_at(&mut self, parent: NodeId, index: usize, nodes: &[NodeId]) {
        for &node in nodes {
            self.nodes[node].parent = Some(parent);
        }
        let children = &mut self.nodes[parent].children;
        let index = index.min(children.len());
        children.splice(index..index, nodes.iter().copied());

        if self.is_connected(parent) {
            for &node in nodes {
                self.upgrade_subtree(node);
            }
        }
    }

    /// Append a node (or a fragment's children) to `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.check_insertable(parent, child)?;
        let nodes = self.take_insertables(child)?;
        let end = self.children(parent).len();
        self.insert_at(parent, end, &nodes);
        Ok(())
    }

    /// Insert `node` immediately before `reference` (the DOM `before`).
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> DomResult<()> {
        if reference == node {
            return Ok(());
        }
        let parent = self.parent(reference).ok_or(DomError::Detached)?;
        self.check_insertable(parent, node)?;
        let nodes = self.take_insertables(node)?;
        let (_, index) = self.sibling_position(reference).ok_or(DomError::Detached)?;
        self.insert_at(parent, index, &nodes);
        Ok(())
    }

    /// Replace `old` with `new` and free `old` with its subtree.
    ///
    /// A parentless `old` is left untouched, as the DOM `replaceWith` does.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) -> DomResult<()> {
        if old == new {
            return Ok(());
        }
        if !self.contains(old) {
            return Err(DomError::InvalidNode);
        }
        let Some(parent) = self.parent(old) else {
            return Ok(());
        };
        self.check_insertable(parent, new)?;
        let nodes = self.take_insertables(new)?;
        let (_, index) = self.sibling_position(old).ok_or(DomError::Detached)?;
        self.insert_at(parent, index, &nodes);
        self.remove(old)
    }

    /// Detach a node and free it together with everything it owns.
    pub fn remove(&mut self, id: NodeId) -> DomResult<()> {
        if id == self.root {
            return Err(DomError::HierarchyRequest("the document node cannot be removed"));
        }
        self.detach(id)?;
        self.free_subtree(id);
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let Some(data) = self.nodes.remove(node) else {
                continue;
            };
            stack.extend(data.children);
            if let NodeKind::Element(el) = data.kind {
                stack.extend(el.template_content);
                stack.extend(el.shadow_root);
            }
        }
    }

    /// Clone a node. Deep clones copy children and template content; shadow
    /// roots are never cloned.
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> DomResult<NodeId> {
        let source = self.nodes.get(id).ok_or(DomError::InvalidNode)?;
        let mut kind = source.kind.clone();
        let children = if deep { source.children.clone() } else { Vec::new() };

        if let NodeKind::Element(el) = &mut kind {
            el.shadow_root = None;
            if let Some(content) = el.template_content {
                el.template_content = Some(if deep {
                    self.clone_node(content, true)?
                } else {
                    self.create_fragment()
                });
            }
        }
        if matches!(kind, NodeKind::Document) {
            kind = NodeKind::Fragment;
        }

        let copy = self.nodes.insert(NodeData::new(kind));
        for child in children {
            let child_copy = self.clone_node(child, true)?;
            self.nodes[child_copy].parent = Some(copy);
            self.nodes[copy].children.push(child_copy);
        }
        Ok(copy)
    }

    /// Replace all children of a node with a single text node (`innerText`).
    pub fn set_text(&mut self, id: NodeId, text: &str) -> DomResult<()> {
        let children = std::mem::take(&mut self.nodes.get_mut(id).ok_or(DomError::InvalidNode)?.children);
        for child in children {
            if let Some(data) = self.nodes.get_mut(child) {
                data.parent = None;
            }
            self.free_subtree(child);
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.nodes[node].parent = Some(id);
            self.nodes[id].children.push(node);
        }
        Ok(())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeKind::Text(text)) = self.kind(id) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(NodeKind::Text(text)) = self.kind(node) {
                out.push_str(text);
            }
        }
        out
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Descendants of `root` in document order, excluding `root` itself.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Descendant elements of `root` matching a predicate, in document order.
    pub fn query_all<F>(&self, root: NodeId, pred: F) -> Vec<NodeId>
    where
        F: Fn(&ElementData) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.element(n).is_some_and(&pred))
            .collect()
    }

    /// `[name="value"]`
    pub fn query_attr_eq(&self, root: NodeId, name: &str, value: &str) -> Vec<NodeId> {
        self.query_all(root, |e| e.attribute(name) == Some(value))
    }

    /// `[name^="prefix"]`
    pub fn query_attr_prefix(&self, root: NodeId, name: &str, prefix: &str) -> Vec<NodeId> {
        self.query_all(root, |e| e.attribute(name).is_some_and(|v| v.starts_with(prefix)))
    }

    /// `[name]`
    pub fn query_has_attr(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.query_all(root, |e| e.attribute(name).is_some())
    }

    /// Descendant elements with the given tag name.
    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        self.query_all(root, |e| e.tag == tag)
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_fixture(tree: &mut DomTree) -> (NodeId, Vec<NodeId>) {
        let ul = tree.create_element("ul");
        tree.append_child(tree.root(), ul).unwrap();
        let items: Vec<_> = (0..3)
            .map(|i| {
                let li = tree.create_element("li");
                tree.set_attribute(li, "sb-mark", &format!("list.{i}")).unwrap();
                tree.append_child(ul, li).unwrap();
                li
            })
            .collect();
        (ul, items)
    }

    #[test]
    fn test_append_and_siblings() {
        let mut tree = DomTree::new();
        let (ul, items) = list_fixture(&mut tree);

        assert_eq!(tree.element_children(ul), items);
        assert_eq!(tree.next_element_sibling(items[0]), Some(items[1]));
        assert_eq!(tree.previous_element_sibling(items[0]), None);
        assert_eq!(tree.previous_element_sibling(items[2]), Some(items[1]));
        assert!(tree.is_connected(items[2]));
    }

    #[test]
    fn test_insert_before_moves_node() {
        let mut tree = DomTree::new();
        let (ul, items) = list_fixture(&mut tree);

        tree.insert_before(items[0], items[2]).unwrap();
        assert_eq!(tree.element_children(ul), vec![items[2], items[0], items[1]]);
    }

    #[test]
    fn test_replace_with_frees_old() {
        let mut tree = DomTree::new();
        let (ul, items) = list_fixture(&mut tree);
        let fresh = tree.create_element("li");

        tree.replace_with(items[1], fresh).unwrap();
        assert_eq!(tree.element_children(ul), vec![items[0], fresh, items[2]]);
        assert!(!tree.contains(items[1]));
    }

    #[test]
    fn test_circular_insert_rejected() {
        let mut tree = DomTree::new();
        let (ul, items) = list_fixture(&mut tree);

        let err = tree.append_child(items[0], ul).unwrap_err();
        assert!(matches!(err, DomError::HierarchyRequest(_)));
    }

    #[test]
    fn test_queries_skip_template_content() {
        let mut tree = DomTree::new();
        let template = tree.create_element("template");
        tree.set_attribute(template, "sb-mark", "list.#").unwrap();
        let content = tree.template_content(template).unwrap();
        let li = tree.create_element("li");
        tree.set_attribute(li, "sb-mark", "list.#").unwrap();
        tree.append_child(content, li).unwrap();
        tree.append_child(tree.root(), template).unwrap();

        let found = tree.query_attr_eq(tree.root(), "sb-mark", "list.#");
        assert_eq!(found, vec![template]);
        assert!(!tree.is_connected(li));
        assert_eq!(tree.parent_element(li), None);
    }

    #[test]
    fn test_deep_clone_copies_template_content() {
        let mut tree = DomTree::new();
        let template = tree.create_element("template");
        let content = tree.template_content(template).unwrap();
        let p = tree.create_element("p");
        tree.set_text(p, "hello").unwrap();
        tree.append_child(content, p).unwrap();

        let copy = tree.clone_node(template, true).unwrap();
        let copy_content = tree.template_content(copy).unwrap();
        assert_ne!(copy_content, content);
        let copy_p = tree.first_element_child(copy_content).unwrap();
        assert_eq!(tree.text_content(copy_p), "hello");
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let span = tree.create_element("span");
        tree.append_child(div, span).unwrap();

        tree.set_text(div, "plain").unwrap();
        assert!(!tree.contains(span));
        assert_eq!(tree.text_content(div), "plain");
        assert_eq!(tree.children(div).len(), 1);
    }

    #[test]
    fn test_fragment_insertion_moves_children() {
        let mut tree = DomTree::new();
        let fragment = tree.create_fragment();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        tree.append_child(fragment, a).unwrap();
        tree.append_child(fragment, b).unwrap();

        tree.append_child(tree.root(), fragment).unwrap();
        assert_eq!(tree.element_children(tree.root()), vec![a, b]);
        assert!(tree.children(fragment).is_empty());
    }
}
