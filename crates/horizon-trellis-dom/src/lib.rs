//! In-memory document tree for Horizon Trellis.
//!
//! This crate provides the mutable node tree the reactive store binds to:
//!
//! - **Tree**: arena-backed elements, text, comments and fragments with
//!   parent/child links ([`DomTree`])
//! - **Templates**: `<template>` elements own a concealed content fragment
//!   that queries never descend into
//! - **Queries**: attribute equality, attribute prefix and tag lookups
//! - **Markup**: parsing and serialization of well-formed markup
//! - **Components**: `<template name="x-y">` definitions upgrade matching
//!   elements with an encapsulated shadow subtree
//! - **Shared access**: the [`Document`] handle wraps a tree in a lock
//!
//! # Example
//!
//! ```
//! use horizon_trellis_dom::Document;
//!
//! let doc = Document::from_html(r#"<ul><li sb-mark="list.0">one</li></ul>"#).unwrap();
//! let items = doc.query_attr_eq("sb-mark", "list.0");
//! assert_eq!(doc.text_content(items[0]), "one");
//!
//! doc.with_write(|tree| tree.set_text(items[0], "uno")).unwrap();
//! assert_eq!(doc.to_html(), r#"<ul><li sb-mark="list.0">uno</li></ul>"#);
//! ```

mod component;
mod document;
mod error;
pub mod logging;
mod markup;
mod node;
mod tree;

pub use component::is_valid_component_name;
pub use document::Document;
pub use error::{DomError, DomResult};
pub use logging::{DomTreeDebug, PerfSpan, TreeFormatOptions, TreeStyle};
pub use node::{ElementData, NodeId, NodeKind, ReadyState};
pub use tree::DomTree;
