//! Markup serializer - turn a tree back into XML or HTML-flavored text
//!
//! This module handles:
//! - Namespace prefix resolution and declaration (see `namespace`)
//! - Escaping per profile and output encoding
//! - Characters that are invalid in XML, per the configured policy
//! - Two-space indentation of element-only content

use std::io::Write;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::namespace::NamespaceStack;
use crate::settings::{IncorrectCharacterPolicy, SerializeProfile, WriterSettings};
use crate::view::{TreeView, ViewElement, ViewNode};

const INDENT: &str = "  ";

/// HTML elements that never have content
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Characters that may not appear in an XML 1.0 document
fn is_invalid_xml_char(c: char) -> bool {
    matches!(c as u32, 0x0..=0x8 | 0xB | 0xC | 0xE..=0x1F | 0xFFFE | 0xFFFF)
}

fn qualified_name(prefix: Option<&str>, local_name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local_name),
        _ => local_name.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeContext {
    Text,
    Attribute,
}

/// Tree serializer
#[derive(Debug, Clone, Default)]
pub struct XmlSerializer {
    settings: WriterSettings,
}

impl XmlSerializer {
    pub fn new() -> Self {
        Self::with_settings(WriterSettings::default())
    }

    pub fn with_settings(settings: WriterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    /// Serialize the subtree rooted at `node`
    pub fn serialize<T: TreeView>(&self, tree: &T, node: T::Id) -> Result<String> {
        let mut writer = MarkupWriter {
            settings: &self.settings,
            out: String::with_capacity(4096),
            stack: NamespaceStack::new(self.settings.namespace_context.as_ref()),
        };
        writer.write_root(tree, node)?;
        Ok(writer.out)
    }

    /// Serialize the arena's root node
    pub fn serialize_document(&self, arena: &DomArena) -> Result<String> {
        let root_id = arena
            .root_id()
            .ok_or_else(|| DomError::Serialization("No root node set".to_string()))?;
        self.serialize(arena, root_id)
    }

    /// Serialize and write the bytes in the configured output encoding
    pub fn write_to<T: TreeView, W: Write>(&self, tree: &T, node: T::Id, mut sink: W) -> Result<()> {
        let text = self.serialize(tree, node)?;
        sink.write_all(&self.settings.encoding.encode(&text))?;
        sink.flush()?;
        Ok(())
    }
}

/// State of one serialization pass
struct MarkupWriter<'s> {
    settings: &'s WriterSettings,
    out: String,
    stack: NamespaceStack<'s>,
}

impl<'s> MarkupWriter<'s> {
    fn write_root<T: TreeView>(&mut self, tree: &T, id: T::Id) -> Result<()> {
        match tree.node(id)? {
            ViewNode::Document => {
                if self.settings.emit_xml_declaration && self.settings.profile == SerializeProfile::Xml {
                    self.out.push_str("<?xml version=\"1.0\" encoding=\"");
                    self.out.push_str(self.settings.encoding.name());
                    self.out.push_str("\"?>");
                    self.out.push_str(&self.settings.newline);
                }
                let (children, _) = self.visible_children(tree, id)?;
                for child in children {
                    self.write_node(tree, child, 0, self.settings.indent)?;
                    if self.settings.indent {
                        self.out.push_str(&self.settings.newline);
                    }
                }
                Ok(())
            }
            _ => self.write_node(tree, id, 0, self.settings.indent),
        }
    }

    /// Children to write: containers replaced by their content, suppressed
    /// node kinds removed. Also reports whether any of them is text.
    fn visible_children<T: TreeView>(&self, tree: &T, id: T::Id) -> Result<(Vec<T::Id>, bool)> {
        let mut visible = Vec::new();
        let mut has_text = false;
        self.collect_visible(tree, id, &mut visible, &mut has_text)?;
        Ok((visible, has_text))
    }

    fn collect_visible<T: TreeView>(
        &self,
        tree: &T,
        id: T::Id,
        visible: &mut Vec<T::Id>,
        has_text: &mut bool,
    ) -> Result<()> {
        for child in tree.children(id)? {
            match tree.node(child)? {
                ViewNode::Container => self.collect_visible(tree, child, visible, has_text)?,
                ViewNode::Comment(_) if !self.settings.emit_comments => {}
                ViewNode::DocumentType { .. } if !self.settings.emit_doc_type => {}
                ViewNode::Text(_) | ViewNode::CData(_) | ViewNode::EntityReference(_) => {
                    *has_text = true;
                    visible.push(child);
                }
                _ => visible.push(child),
            }
        }
        Ok(())
    }

    fn write_node<T: TreeView>(&mut self, tree: &T, id: T::Id, depth: usize, indent: bool) -> Result<()> {
        match tree.node(id)? {
            ViewNode::Document | ViewNode::Container => {
                let (children, has_text) = self.visible_children(tree, id)?;
                let indent = indent && !has_text;
                for (i, child) in children.into_iter().enumerate() {
                    if indent && i > 0 {
                        self.newline_and_indent(depth);
                    }
                    self.write_node(tree, child, depth, indent)?;
                }
            }
            ViewNode::DocumentType {
                name,
                public_id,
                system_id,
            } => {
                if self.settings.emit_doc_type {
                    self.write_doctype(name, public_id, system_id)?;
                }
            }
            ViewNode::Element(element) => self.write_element(tree, id, &element, depth, indent)?,
            ViewNode::Text(text) => self.write_escaped(text, EscapeContext::Text)?,
            ViewNode::CData(text) => {
                self.out.push_str("<![CDATA[");
                self.write_raw(&text.replace("]]>", "]]]]><![CDATA[>"))?;
                self.out.push_str("]]>");
            }
            ViewNode::Comment(text) => {
                if self.settings.emit_comments {
                    self.out.push_str("<!--");
                    self.write_raw(text)?;
                    self.out.push_str("-->");
                }
            }
            ViewNode::ProcessingInstruction { target, data } => {
                self.out.push_str("<?");
                self.write_name(target)?;
                if let Some(data) = data.filter(|d| !d.is_empty()) {
                    self.out.push(' ');
                    self.write_raw(data)?;
                }
                self.out.push_str("?>");
            }
            ViewNode::EntityReference(name) => {
                self.out.push('&');
                self.write_name(name)?;
                self.out.push(';');
            }
        }
        Ok(())
    }

    fn write_doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        self.out.push_str("<!DOCTYPE ");
        self.write_name(name)?;
        match (public_id, system_id) {
            (Some(public_id), system_id) => {
                self.out.push_str(" PUBLIC \"");
                self.write_raw(public_id)?;
                self.out.push('"');
                if let Some(system_id) = system_id {
                    self.out.push_str(" \"");
                    self.write_raw(system_id)?;
                    self.out.push('"');
                }
            }
            (None, Some(system_id)) => {
                self.out.push_str(" SYSTEM \"");
                self.write_raw(system_id)?;
                self.out.push('"');
            }
            (None, None) => {}
        }
        self.out.push('>');
        Ok(())
    }

    fn write_element<T: TreeView>(
        &mut self,
        tree: &T,
        id: T::Id,
        element: &ViewElement<'_>,
        depth: usize,
        indent: bool,
    ) -> Result<()> {
        let emit_namespaces = self.settings.emit_namespaces;
        self.stack.push();

        if emit_namespaces {
            for declaration in &element.declarations {
                match declaration.prefix {
                    None => self.stack.add_default_namespace_uri(declaration.uri),
                    Some("xml") | Some("xmlns") => {}
                    Some(prefix) => {
                        self.stack.add_prefix_mapping(prefix, declaration.uri);
                    }
                }
            }
        }

        // New bindings that must be declared on this start tag
        let mut pending: Vec<(Option<String>, &str)> = Vec::new();

        let prefix = match element.namespace_uri.filter(|uri| !uri.is_empty()) {
            _ if !emit_namespaces => None,
            Some(uri) => {
                let resolved = self.stack.resolve_element(uri);
                if resolved.declare {
                    pending.push((resolved.prefix.clone(), uri));
                }
                resolved.prefix
            }
            // An own default declaration on the element decides by itself
            None if element.declarations.iter().any(|d| d.prefix.is_none()) => None,
            None => {
                if self.stack.resolve_no_namespace().declare {
                    pending.push((None, ""));
                }
                None
            }
        };
        let name = qualified_name(prefix.as_deref(), element.local_name);

        let mut attributes = Vec::with_capacity(element.attributes.len());
        for attr in &element.attributes {
            let attr_name = match attr.namespace_uri.filter(|uri| !uri.is_empty()) {
                Some(uri) if emit_namespaces => {
                    let resolved = self.stack.resolve_attribute(uri);
                    if resolved.declare {
                        pending.push((resolved.prefix.clone(), uri));
                    }
                    qualified_name(resolved.prefix.as_deref(), attr.name)
                }
                _ => attr.name.to_string(),
            };
            attributes.push((attr_name, attr.value));
        }

        self.out.push('<');
        self.write_name(&name)?;
        if emit_namespaces {
            for declaration in &element.declarations {
                self.write_declaration(declaration.prefix, declaration.uri)?;
            }
            for (prefix, uri) in &pending {
                self.write_declaration(prefix.as_deref(), uri)?;
            }
        }
        for (attr_name, value) in &attributes {
            self.write_attribute(attr_name, value)?;
        }

        let (children, has_text) = self.visible_children(tree, id)?;
        if children.is_empty() {
            self.close_empty_element(&name, element.local_name)?;
        } else {
            self.out.push('>');
            let indent_children = indent && !has_text;
            for child in children {
                if indent_children {
                    self.newline_and_indent(depth + 1);
                }
                self.write_node(tree, child, depth + 1, indent_children)?;
            }
            if indent_children {
                self.newline_and_indent(depth);
            }
            self.out.push_str("</");
            self.write_name(&name)?;
            self.out.push('>');
        }

        self.stack.pop();
        Ok(())
    }

    fn close_empty_element(&mut self, name: &str, local_name: &str) -> Result<()> {
        match self.settings.profile {
            SerializeProfile::Html if !HTML_VOID_ELEMENTS.contains(&local_name.to_ascii_lowercase().as_str()) => {
                self.out.push_str("></");
                self.write_name(name)?;
                self.out.push('>');
            }
            SerializeProfile::Html => self.out.push_str(" />"),
            SerializeProfile::Xml if self.settings.space_on_self_closed_element => {
                self.out.push_str(" />")
            }
            SerializeProfile::Xml => self.out.push_str("/>"),
        }
        Ok(())
    }

    fn write_declaration(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        match prefix {
            Some(prefix) => self.write_attribute(&format!("xmlns:{}", prefix), uri),
            None => self.write_attribute("xmlns", uri),
        }
    }

    fn write_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.out.push(' ');
        self.write_name(name)?;
        self.out.push_str("=\"");
        self.write_escaped(value, EscapeContext::Attribute)?;
        self.out.push('"');
        Ok(())
    }

    fn newline_and_indent(&mut self, depth: usize) {
        self.out.push_str(&self.settings.newline);
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    /// Apply the incorrect-character policy. Returns whether to write `c`.
    ///
    /// Where `referable` is set, characters outside the output encoding are
    /// written as character references and only XML-invalid ones are subject
    /// to the policy.
    fn accept_char(&self, c: char, referable: bool) -> Result<bool> {
        let unencodable = !referable && !self.settings.encoding.can_encode(c);
        if !unencodable && !is_invalid_xml_char(c) {
            return Ok(true);
        }
        match self.settings.incorrect_characters {
            IncorrectCharacterPolicy::WriteAsIs => Ok(true),
            IncorrectCharacterPolicy::DropWithLog if unencodable => {
                tracing::warn!(
                    "Dropping character U+{:04X} not representable in {}",
                    c as u32,
                    self.settings.encoding.name()
                );
                Ok(false)
            }
            IncorrectCharacterPolicy::DropWithLog => {
                tracing::warn!("Dropping invalid XML character U+{:04X}", c as u32);
                Ok(false)
            }
            IncorrectCharacterPolicy::Fail => Err(DomError::InvalidCharacter {
                codepoint: c as u32,
            }),
        }
    }

    /// Comment, CDATA and PI content: nothing can be escaped there
    fn write_raw(&mut self, text: &str) -> Result<()> {
        for c in text.chars() {
            if self.accept_char(c, false)? {
                self.out.push(c);
            }
        }
        Ok(())
    }

    /// Element, attribute, target and entity names
    fn write_name(&mut self, name: &str) -> Result<()> {
        for c in name.chars() {
            if self.accept_char(c, false)? {
                self.out.push(c);
            }
        }
        Ok(())
    }

    fn write_escaped(&mut self, text: &str, context: EscapeContext) -> Result<()> {
        let html = self.settings.profile == SerializeProfile::Html;
        let attribute = context == EscapeContext::Attribute;

        for c in text.chars() {
            if !self.accept_char(c, true)? {
                continue;
            }
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' if !(html && attribute) => self.out.push_str("&lt;"),
                '>' if !(html && attribute) => self.out.push_str("&gt;"),
                '"' if attribute => self.out.push_str("&quot;"),
                '\t' if attribute && !html => self.out.push_str("&#9;"),
                '\n' if attribute && !html => self.out.push_str("&#10;"),
                '\r' if !html => self.out.push_str("&#13;"),
                '\u{A0}' if html => self.out.push_str("&nbsp;"),
                c if !self.settings.encoding.can_encode(c) => {
                    self.out.push_str(&format!("&#x{:X};", c as u32));
                }
                c => self.out.push(c),
            }
        }
        Ok(())
    }
}
