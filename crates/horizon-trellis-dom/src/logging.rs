//! Logging and debugging facilities for the document tree.
//!
//! Diagnostics are emitted through `tracing` under the targets listed in
//! [`targets`]. [`DomTreeDebug`] renders a node tree for inspection:
//!
//! ```
//! use horizon_trellis_dom::{Document, DomTreeDebug};
//!
//! let doc = Document::from_html(r#"<ul><li sb-mark="list.0">x</li></ul>"#).unwrap();
//! let text = doc.with_read(|tree| DomTreeDebug::new().format_subtree(tree, tree.root()));
//! assert!(text.contains("<li"));
//! ```

use std::fmt::Write as FmtWrite;

use crate::node::{NodeId, NodeKind};
use crate::tree::DomTree;

/// Target names for log filtering.
pub mod targets {
    /// Tree mutation target.
    pub const TREE: &str = "horizon_trellis_dom::tree";
    /// Component registration target.
    pub const COMPONENT: &str = "horizon_trellis_dom::component";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show attributes.
    pub show_attributes: bool,
    /// Whether to descend into template content.
    pub show_template_content: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            show_attributes: true,
            show_template_content: true,
            max_depth: None,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_ids: true,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing a document tree.
#[derive(Debug, Clone, Default)]
pub struct DomTreeDebug {
    options: TreeFormatOptions,
}

impl DomTreeDebug {
    /// Create a debug visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, tree: &DomTree, root: NodeId) -> String {
        let mut output = String::new();
        self.format_into(tree, root, 0, &mut output);
        output
    }

    fn format_into(&self, tree: &DomTree, id: NodeId, depth: usize, output: &mut String) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth));
        match tree.kind(id) {
            Some(NodeKind::Document) => output.push_str("#document"),
            Some(NodeKind::Fragment) => output.push_str("#fragment"),
            Some(NodeKind::Text(text)) => {
                write!(output, "{text:?}").expect("write to String");
            }
            Some(NodeKind::Comment(text)) => {
                write!(output, "<!--{text}-->").expect("write to String");
            }
            Some(NodeKind::Element(el)) => {
                write!(output, "<{}", el.tag()).expect("write to String");
                if self.options.show_attributes {
                    for (k, v) in el.attributes() {
                        write!(output, " {k}={v:?}").expect("write to String");
                    }
                }
                output.push('>');
            }
            None => output.push_str("(removed)"),
        }
        if self.options.show_ids {
            write!(output, " [{:?}]", id).expect("write to String");
        }
        output.push('\n');

        if self.options.show_template_content {
            if let Some(content) = tree.template_content(id) {
                self.format_into(tree, content, depth + 1, output);
            }
        }
        for &child in tree.children(id) {
            self.format_into(tree, child, depth + 1, output);
        }
    }

    fn build_prefix(&self, depth: usize) -> String {
        if depth == 0 {
            return String::new();
        }
        let (branch, corner) = match self.options.style {
            TreeStyle::Ascii => ("|  ", "+-- "),
            TreeStyle::Unicode => ("\u{2502}  ", "\u{2514}\u{2500}\u{2500} "),
        };
        let mut prefix = branch.repeat(depth - 1);
        prefix.push_str(corner);
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_trellis::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
