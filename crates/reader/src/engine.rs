//! Parser engines
//!
//! A `ParserEngine` is a reusable, stateful parser. Per request it is bound to
//! an entity resolver and an error handler, drives a `ContentHandler`, and is
//! reset before it goes back to the pool.
//!
//! `RoxmlEngine` parses with roxmltree. roxmltree always expands entities and
//! merges CDATA into text; it does not keep the DOCTYPE, so the prolog is
//! scanned separately.

use microdom::namespace::XML_NS_URI;
use microdom::view::{TreeView, ViewNode};
use std::sync::Arc;

use crate::builder::{ContentHandler, StartElement};
use crate::error::Result;
use crate::handlers::{EntityResolver, ErrorHandler, LoggingErrorHandler, ParseMessage};
use crate::input::ResolvedInput;
use crate::settings::{EngineConfig, EngineLimits};

pub trait ParserEngine: Send {
    fn config(&self) -> &EngineConfig;

    /// Attach the per-request callbacks
    fn bind(
        &mut self,
        entity_resolver: Option<Arc<dyn EntityResolver>>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    );

    /// Parse `input`, reporting content to `handler`. Diagnostics, fatal ones
    /// included, go to the bound error handler; `Err` is reserved for
    /// failures of the content handler.
    fn parse(&mut self, input: &ResolvedInput, handler: &mut dyn ContentHandler) -> Result<()>;

    /// Drop per-request state
    fn reset(&mut self);
}

/// `<!DOCTYPE ...>` found in the prolog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Byte offset of `]` closing the internal subset, if there is one
    subset_end: Option<usize>,
    /// Byte offset of the final `>`
    end: usize,
}

impl DoctypeDecl {
    /// Copy of `text` with `declarations` added at the end of the internal
    /// subset. Internal declarations come first and take precedence.
    fn splice(&self, text: &str, declarations: &str) -> String {
        let mut out = String::with_capacity(text.len() + declarations.len() + 3);
        match self.subset_end {
            Some(at) => {
                out.push_str(&text[..at]);
                out.push_str(declarations);
                out.push_str(&text[at..]);
            }
            None => {
                out.push_str(&text[..self.end]);
                out.push_str(" [");
                out.push_str(declarations);
                out.push(']');
                out.push_str(&text[self.end..]);
            }
        }
        out
    }
}

/// Minimal prolog cursor
struct Scanner<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Scanner<'t> {
    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_past(&mut self, token: &str) -> Option<()> {
        let at = self.rest().find(token)?;
        self.pos += at + token.len();
        Some(())
    }

    fn name(&mut self) -> Option<&'t str> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c == '[' || c == '>')
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    fn quoted(&mut self) -> Option<&'t str> {
        let rest = self.rest();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let close = rest[1..].find(quote)?;
        self.pos += close + 2;
        Some(&rest[1..close + 1])
    }

    /// Advance to the `]` closing an internal subset, stepping over literals,
    /// comments and processing instructions
    fn skip_subset(&mut self) -> Option<()> {
        loop {
            let at = self
                .rest()
                .find(|c: char| matches!(c, ']' | '"' | '\'' | '<'))?;
            self.pos += at;
            if self.eat("<!--") {
                self.skip_past("-->")?;
            } else if self.eat("<?") {
                self.skip_past("?>")?;
            } else if self.eat("<") {
                continue;
            } else if self.rest().starts_with(']') {
                return Some(());
            } else {
                self.quoted()?;
            }
        }
    }
}

/// Find the DOCTYPE declaration, skipping the XML declaration, comments and
/// processing instructions before it
pub fn scan_doctype(text: &str) -> Option<DoctypeDecl> {
    let mut scanner = Scanner { text, pos: 0 };
    loop {
        scanner.skip_whitespace();
        if scanner.eat("<?") {
            scanner.skip_past("?>")?;
        } else if scanner.eat("<!--") {
            scanner.skip_past("-->")?;
        } else if scanner.eat("<!DOCTYPE") {
            break;
        } else {
            return None;
        }
    }

    scanner.skip_whitespace();
    let name = scanner.name()?.to_string();
    scanner.skip_whitespace();

    let (public_id, system_id) = if scanner.eat("PUBLIC") {
        scanner.skip_whitespace();
        let public_id = scanner.quoted()?;
        scanner.skip_whitespace();
        (Some(public_id), scanner.quoted())
    } else if scanner.eat("SYSTEM") {
        scanner.skip_whitespace();
        (None, Some(scanner.quoted()?))
    } else {
        (None, None)
    };
    scanner.skip_whitespace();

    let mut subset_end = None;
    if scanner.eat("[") {
        scanner.skip_subset()?;
        subset_end = Some(scanner.pos);
        scanner.pos += 1;
        scanner.skip_whitespace();
    }
    if !scanner.rest().starts_with('>') {
        return None;
    }

    Some(DoctypeDecl {
        name,
        public_id: public_id.map(str::to_string),
        system_id: system_id.map(str::to_string),
        subset_end,
        end: scanner.pos,
    })
}

/// roxmltree-backed engine
pub struct RoxmlEngine {
    config: EngineConfig,
    limits: EngineLimits,
    entity_resolver: Option<Arc<dyn EntityResolver>>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl std::fmt::Debug for RoxmlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoxmlEngine")
            .field("config", &self.config)
            .field("limits", &self.limits)
            .field("entity_resolver", &self.entity_resolver.is_some())
            .finish()
    }
}

impl RoxmlEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_limits(config, EngineLimits::default())
    }

    pub fn with_limits(config: EngineConfig, limits: EngineLimits) -> Self {
        if config.validating {
            tracing::warn!("DTD validation is not supported, documents are only checked for well-formedness");
        }
        if config.xinclude_aware {
            tracing::warn!("XInclude is not supported, xi:include elements are kept as is");
        }
        if !config.expand_entity_references {
            tracing::warn!("Entity references are always expanded");
        }
        Self {
            config,
            limits,
            entity_resolver: None,
            error_handler: Arc::new(LoggingErrorHandler),
        }
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    fn report(&self, message: ParseMessage) {
        self.error_handler.handle(&message);
    }

    fn emit_children(
        &self,
        document: &roxmltree::Document<'_>,
        node: roxmltree::Node<'_, '_>,
        doctype: Option<&DoctypeDecl>,
        handler: &mut dyn ContentHandler,
    ) -> Result<()> {
        let mut doctype = doctype;
        let element_content = node.is_element() && node.children().any(|c| c.is_element());

        for child in node.children() {
            match child.node_type() {
                roxmltree::NodeType::Element => {
                    // The DOCTYPE goes right before the document element
                    if let Some(decl) = doctype.take() {
                        handler.doctype(
                            &decl.name,
                            decl.public_id.as_deref(),
                            decl.system_id.as_deref(),
                        )?;
                    }
                    self.emit_element(document, child, handler)?;
                }
                roxmltree::NodeType::Text => {
                    let text = child.text().unwrap_or_default();
                    if self.config.ignore_element_content_whitespace
                        && element_content
                        && text.trim().is_empty()
                    {
                        continue;
                    }
                    handler.characters(text)?;
                }
                roxmltree::NodeType::Comment => {
                    if !self.config.ignore_comments {
                        handler.comment(child.text().unwrap_or_default())?;
                    }
                }
                roxmltree::NodeType::PI => {
                    if let Some(pi) = child.pi() {
                        handler.processing_instruction(pi.target, pi.value)?;
                    }
                }
                roxmltree::NodeType::Root => {}
            }
        }
        Ok(())
    }

    fn emit_element(
        &self,
        document: &roxmltree::Document<'_>,
        node: roxmltree::Node<'_, '_>,
        handler: &mut dyn ContentHandler,
    ) -> Result<()> {
        let ViewNode::Element(view) = document.node(node.id())? else {
            return Ok(());
        };

        let mut attributes = Vec::with_capacity(view.declarations.len() + view.attributes.len());
        for declaration in &view.declarations {
            let name = match declaration.prefix {
                Some(prefix) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            attributes.push((name, declaration.uri));
        }
        for attr in &view.attributes {
            attributes.push((qualified_name(node, attr.namespace_uri, attr.name), attr.value));
        }

        let qualified;
        let (namespace_uri, name) = if self.config.namespace_aware {
            (view.namespace_uri, view.local_name)
        } else {
            qualified = qualified_name(node, view.namespace_uri, view.local_name);
            (None, qualified.as_str())
        };

        handler.start_element(&StartElement {
            namespace_uri,
            name,
            attributes,
        })?;
        self.emit_children(document, node, None, handler)?;
        handler.end_element()
    }
}

/// Name with the prefix bound to `namespace_uri` in the scope of `node`
fn qualified_name(node: roxmltree::Node<'_, '_>, namespace_uri: Option<&str>, local_name: &str) -> String {
    let prefix = match namespace_uri {
        Some(XML_NS_URI) => Some("xml"),
        Some(uri) => node.lookup_prefix(uri),
        None => None,
    };
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local_name),
        _ => local_name.to_string(),
    }
}

impl ParserEngine for RoxmlEngine {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn bind(
        &mut self,
        entity_resolver: Option<Arc<dyn EntityResolver>>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) {
        self.entity_resolver = entity_resolver;
        self.error_handler = error_handler.unwrap_or_else(|| Arc::new(LoggingErrorHandler));
    }

    fn parse(&mut self, input: &ResolvedInput, handler: &mut dyn ContentHandler) -> Result<()> {
        let system_id = input.system_id.as_deref();
        let doctype = scan_doctype(&input.text);

        let external = match (&doctype, &self.entity_resolver) {
            (Some(decl), Some(resolver)) => decl.system_id.as_deref().and_then(|system| {
                let declarations = resolver.resolve_entity(decl.public_id.as_deref(), system);
                if declarations.is_none() {
                    self.report(
                        ParseMessage::warning(format!("External DTD subset '{}' not resolved", system))
                            .in_system(system_id),
                    );
                }
                declarations.map(|d| decl.splice(&input.text, &d))
            }),
            _ => None,
        };
        let text = external.as_deref().unwrap_or(&input.text);

        let mut options = roxmltree::ParsingOptions::default();
        options.allow_dtd = self.limits.allow_dtd;
        options.nodes_limit = self.limits.nodes_limit;

        let document = match roxmltree::Document::parse_with_options(text, options) {
            Ok(document) => document,
            Err(err) => {
                let pos = err.pos();
                self.report(
                    ParseMessage::fatal(err.to_string())
                        .at(pos.row, pos.col)
                        .in_system(system_id),
                );
                return Ok(());
            }
        };

        handler.start_document()?;
        self.emit_children(&document, document.root(), doctype.as_ref(), handler)?;
        handler.end_document()
    }

    fn reset(&mut self) {
        self.entity_resolver = None;
        self.error_handler = Arc::new(LoggingErrorHandler);
    }
}
