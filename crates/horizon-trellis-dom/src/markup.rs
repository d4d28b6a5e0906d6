//! Markup parsing and serialization.
//!
//! Markup is read with `quick-xml`, so it must be well formed: void elements
//! are written self-closing (`<br/>`) and attribute values are quoted. The
//! children of a `<template>` element are parsed into its content fragment.
//! Inter-element whitespace is trimmed.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{DomError, DomResult};
use crate::node::{NodeId, NodeKind};
use crate::tree::DomTree;

impl DomTree {
    /// Parse markup into detached top-level nodes.
    pub fn parse_fragment(&mut self, markup: &str) -> DomResult<Vec<NodeId>> {
        let holder = self.create_fragment();
        let result = self.parse_into(holder, markup);
        if let Err(err) = result {
            self.remove(holder)?;
            return Err(err);
        }
        let nodes = self.children(holder).to_vec();
        for &node in &nodes {
            self.detach(node)?;
        }
        self.remove(holder)?;
        Ok(nodes)
    }

    /// Parse markup and append the resulting nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> DomResult<Vec<NodeId>> {
        let nodes = self.parse_fragment(markup)?;
        for &node in &nodes {
            self.append_child(parent, node)?;
        }
        Ok(nodes)
    }

    fn parse_into(&mut self, holder: NodeId, markup: &str) -> DomResult<()> {
        let mut reader = Reader::from_str(markup);
        reader.config_mut().trim_text(true);

        let mut stack = vec![holder];
        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| DomError::parse(e.to_string(), position))?;
            let parent = stack.last().copied().unwrap_or(holder);
            match event {
                Event::Start(start) => {
                    let el = self.element_from_start(&start, position)?;
                    self.append_child(parent, el)?;
                    stack.push(self.template_content(el).unwrap_or(el));
                }
                Event::Empty(empty) => {
                    let el = self.element_from_start(&empty, position)?;
                    self.append_child(parent, el)?;
                }
                Event::End(_) => {
                    if stack.len() <= 1 {
                        return Err(DomError::parse("unexpected closing tag", position));
                    }
                    stack.pop();
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| DomError::parse(e.to_string(), position))?;
                    if !text.is_empty() {
                        let node = self.create_text(text.into_owned());
                        self.append_child(parent, node)?;
                    }
                }
                Event::CData(cdata) => {
                    let node = self.create_text(String::from_utf8_lossy(&cdata).into_owned());
                    self.append_child(parent, node)?;
                }
                Event::Comment(comment) => {
                    let node = self.create_comment(String::from_utf8_lossy(&comment).into_owned());
                    self.append_child(parent, node)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() > 1 {
            return Err(DomError::parse("unclosed element", reader.buffer_position()));
        }
        Ok(())
    }

    fn element_from_start(&mut self, start: &BytesStart<'_>, position: u64) -> DomResult<NodeId> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let el = self.create_element(&tag);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| DomError::parse(e.to_string(), position))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DomError::parse(e.to_string(), position))?;
            self.set_attribute(el, &key, &value)?;
        }
        Ok(el)
    }

    /// Serialize a node including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut writer = Writer::new(Vec::new());
        self.write_node(id, &mut writer);
        String::from_utf8(writer.into_inner()).unwrap_or_default()
    }

    /// Serialize the children of a node (template content for templates).
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut writer = Writer::new(Vec::new());
        for &child in self.serialized_children(id) {
            self.write_node(child, &mut writer);
        }
        String::from_utf8(writer.into_inner()).unwrap_or_default()
    }

    fn serialized_children(&self, id: NodeId) -> &[NodeId] {
        match self.template_content(id) {
            Some(content) => self.children(content),
            None => self.children(id),
        }
    }

    fn write_node(&self, id: NodeId, writer: &mut Writer<Vec<u8>>) {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => {
                let mut start = BytesStart::new(el.tag());
                for (k, v) in el.attributes() {
                    start.push_attribute((k.as_str(), v.as_str()));
                }
                let _ = writer.write_event(Event::Start(start));
                for &child in self.serialized_children(id) {
                    self.write_node(child, writer);
                }
                let _ = writer.write_event(Event::End(BytesEnd::new(el.tag())));
            }
            Some(NodeKind::Text(text)) => {
                let _ = writer.write_event(Event::Text(BytesText::new(text)));
            }
            Some(NodeKind::Comment(text)) => {
                let _ = writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())));
            }
            Some(NodeKind::Document | NodeKind::Fragment) => {
                for &child in self.children(id) {
                    self.write_node(child, writer);
                }
            }
            None => {}
        }
    }
}
