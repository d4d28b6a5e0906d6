//! Thread-safe document handle.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DomResult;
use crate::node::{NodeId, ReadyState};
use crate::tree::DomTree;

/// A cloneable, thread-safe handle to a [`DomTree`].
///
/// Clones share the same tree. Reads may run concurrently; writes are
/// exclusive. Closures passed to [`with_read`](Self::with_read) and
/// [`with_write`](Self::with_write) must not call back into the same
/// document.
#[derive(Clone, Default)]
pub struct Document {
    inner: Arc<RwLock<DomTree>>,
}

static_assertions::assert_impl_all!(Document: Send, Sync);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document whose children are parsed from markup.
    pub fn from_html(markup: &str) -> DomResult<Self> {
        let mut tree = DomTree::new();
        let root = tree.root();
        tree.append_html(root, markup)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(tree)),
        })
    }

    /// Run a closure with shared access to the tree.
    pub fn with_read<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a closure with exclusive access to the tree.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Whether two handles share the same tree.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        self.inner.read().root()
    }

    /// The first `<body>` element, or the document node.
    pub fn body(&self) -> NodeId {
        self.inner.read().body()
    }

    /// Current loading state.
    pub fn ready_state(&self) -> ReadyState {
        self.inner.read().ready_state()
    }

    /// Update the loading state.
    pub fn set_ready_state(&self, state: ReadyState) {
        self.inner.write().set_ready_state(state);
    }

    /// Parse markup and append it to `parent`.
    pub fn append_html(&self, parent: NodeId, markup: &str) -> DomResult<Vec<NodeId>> {
        self.inner.write().append_html(parent, markup)
    }

    /// Elements in the document whose attribute equals `value`.
    pub fn query_attr_eq(&self, name: &str, value: &str) -> Vec<NodeId> {
        let tree = self.inner.read();
        tree.query_attr_eq(tree.root(), name, value)
    }

    /// Attribute value of an element.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.inner.read().attribute(id, name).map(str::to_string)
    }

    /// Tag name of an element.
    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        self.inner.read().tag_name(id).map(str::to_string)
    }

    /// Whether the id still refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.read().contains(id)
    }

    /// Child elements of a node.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.read().element_children(id)
    }

    /// Concatenated descendant text.
    pub fn text_content(&self, id: NodeId) -> String {
        self.inner.read().text_content(id)
    }

    /// Serialize a node including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        self.inner.read().outer_html(id)
    }

    /// Serialize the children of a node.
    pub fn inner_html(&self, id: NodeId) -> String {
        self.inner.read().inner_html(id)
    }

    /// Serialize the whole document body.
    pub fn to_html(&self) -> String {
        let tree = self.inner.read();
        tree.inner_html(tree.root())
    }

    /// Register every named `<template>` in the document as a component.
    pub fn register_templates(&self) -> DomResult<Vec<String>> {
        self.inner.write().register_templates(None)
    }

    /// Register the named templates found in a markup string.
    pub fn register_html(&self, markup: &str) -> DomResult<Vec<String>> {
        self.inner.write().register_html(markup)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.inner.read();
        f.debug_struct("Document")
            .field("nodes", &tree.node_count())
            .field("ready_state", &tree.ready_state())
            .finish()
    }
}
