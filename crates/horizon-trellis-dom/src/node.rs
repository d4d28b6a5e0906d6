//! Node identifiers and node payloads.

use slotmap::new_key_type;

new_key_type! {
    /// A unique identifier for a node in a [`DomTree`](crate::DomTree).
    ///
    /// Ids are versioned: once a node is removed its id never resolves again,
    /// even if the slot is reused by a later node.
    pub struct NodeId;
}

impl NodeId {
    /// Convert the NodeId to a raw u64 value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }
}

/// Loading state of a document, mirroring `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// The document is still being loaded.
    Loading,
    /// The document has been parsed; nodes may be queried and mutated.
    #[default]
    Interactive,
    /// The document and all sub-resources have finished loading.
    Complete,
}

impl ReadyState {
    /// Whether bindings may be applied to the document.
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Element payload: tag, ordered attributes and the concealed subtrees an
/// element may own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub(crate) tag: String,
    pub(crate) attributes: Vec<(String, String)>,
    /// Content fragment of a `<template>` element.
    pub(crate) template_content: Option<NodeId>,
    /// Encapsulated subtree of an upgraded component.
    pub(crate) shadow_root: Option<NodeId>,
}

impl ElementData {
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            template_content: None,
            shadow_root: None,
        }
    }

    /// The lowercase tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in insertion order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub(crate) fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    /// Whether this element is a `<template>`.
    pub fn is_template(&self) -> bool {
        self.tag == "template"
    }
}

/// The kind of a node together with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node at the root of the tree.
    Document,
    /// A parentless container (template content, shadow roots, parse results).
    Fragment,
    /// An element.
    Element(ElementData),
    /// A text node.
    Text(String),
    /// A comment node.
    Comment(String),
}

impl NodeKind {
    /// Element payload, if this is an element.
    pub fn as_element(&self) -> Option<&ElementData> {
        match self {
            Self::Element(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            Self::Element(data) => Some(data),
            _ => None,
        }
    }
}

/// Internal storage for a single node.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}
