//! Read-only tree views consumed by the serializer
//!
//! The serializer does not care where a tree comes from. Both the arena and
//! an externally parsed `roxmltree::Document` are presented as `ViewNode`s.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{NodeId, NodeKind};

/// `xmlns` or `xmlns:prefix` declaration on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceDeclaration<'a> {
    /// `None` for the default namespace
    pub prefix: Option<&'a str>,
    pub uri: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewAttribute<'a> {
    pub namespace_uri: Option<&'a str>,
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewElement<'a> {
    pub namespace_uri: Option<&'a str>,
    pub local_name: &'a str,
    /// Namespace declarations made on this element, in source order
    pub declarations: Vec<NamespaceDeclaration<'a>>,
    /// Regular attributes, declarations excluded
    pub attributes: Vec<ViewAttribute<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewNode<'a> {
    Document,
    DocumentType {
        name: &'a str,
        public_id: Option<&'a str>,
        system_id: Option<&'a str>,
    },
    Element(ViewElement<'a>),
    Container,
    Text(&'a str),
    CData(&'a str),
    Comment(&'a str),
    ProcessingInstruction {
        target: &'a str,
        data: Option<&'a str>,
    },
    EntityReference(&'a str),
}

/// A tree the serializer can walk
pub trait TreeView {
    type Id: Copy;

    fn node(&self, id: Self::Id) -> Result<ViewNode<'_>>;

    fn children(&self, id: Self::Id) -> Result<Vec<Self::Id>>;
}

/// Split an attribute name into a namespace declaration, if it is one
fn as_declaration<'a>(name: &'a str, value: &'a str) -> Option<NamespaceDeclaration<'a>> {
    if name == "xmlns" {
        Some(NamespaceDeclaration {
            prefix: None,
            uri: value,
        })
    } else {
        name.strip_prefix("xmlns:").map(|prefix| NamespaceDeclaration {
            prefix: Some(prefix),
            uri: value,
        })
    }
}

impl TreeView for DomArena {
    type Id = NodeId;

    fn node(&self, id: NodeId) -> Result<ViewNode<'_>> {
        let node = self.get(id)?;
        Ok(match node.kind() {
            NodeKind::Document => ViewNode::Document,
            NodeKind::DocumentType(doctype) => ViewNode::DocumentType {
                name: &doctype.name,
                public_id: doctype.public_id.as_deref(),
                system_id: doctype.system_id.as_deref(),
            },
            NodeKind::Element(element) => {
                let mut declarations = Vec::new();
                let mut attributes = Vec::with_capacity(element.attributes().len());
                for (name, value) in element.attributes().iter() {
                    match as_declaration(name, value) {
                        Some(declaration) => declarations.push(declaration),
                        None => attributes.push(ViewAttribute {
                            namespace_uri: None,
                            name,
                            value,
                        }),
                    }
                }
                ViewNode::Element(ViewElement {
                    namespace_uri: element.namespace_uri(),
                    local_name: element.tag_name(),
                    declarations,
                    attributes,
                })
            }
            NodeKind::Container => ViewNode::Container,
            NodeKind::Text(text) => ViewNode::Text(text),
            NodeKind::CData(text) => ViewNode::CData(text),
            NodeKind::Comment(text) => ViewNode::Comment(text),
            NodeKind::ProcessingInstruction { target, data } => ViewNode::ProcessingInstruction {
                target,
                data: data.as_deref(),
            },
            NodeKind::EntityReference(name) => ViewNode::EntityReference(name),
        })
    }

    fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(DomArena::children(self, id)?.to_vec())
    }
}

impl<'input> TreeView for roxmltree::Document<'input> {
    type Id = roxmltree::NodeId;

    fn node(&self, id: roxmltree::NodeId) -> Result<ViewNode<'_>> {
        let node = self
            .get_node(id)
            .ok_or_else(|| DomError::Serialization(format!("unknown external node {:?}", id)))?;

        Ok(match node.node_type() {
            roxmltree::NodeType::Root => ViewNode::Document,
            roxmltree::NodeType::Element => ViewNode::Element(external_element(node)),
            roxmltree::NodeType::Text => ViewNode::Text(node.text().unwrap_or_default()),
            roxmltree::NodeType::Comment => ViewNode::Comment(node.text().unwrap_or_default()),
            roxmltree::NodeType::PI => match node.pi() {
                Some(pi) => ViewNode::ProcessingInstruction {
                    target: pi.target,
                    data: pi.value,
                },
                None => {
                    return Err(DomError::Serialization(format!(
                        "external node {:?} is not a processing instruction",
                        id
                    )))
                }
            },
        })
    }

    fn children(&self, id: roxmltree::NodeId) -> Result<Vec<roxmltree::NodeId>> {
        let node = self
            .get_node(id)
            .ok_or_else(|| DomError::Serialization(format!("unknown external node {:?}", id)))?;
        Ok(node.children().map(|child| child.id()).collect())
    }
}

/// Element view of a parsed node. roxmltree reports every namespace in
/// scope; only those not already in scope on the parent were declared here.
/// An undeclared default shows up as the empty URI and is mapped to `None`.
fn external_element<'a>(node: roxmltree::Node<'a, '_>) -> ViewElement<'a> {
    let parent = node.parent_element();
    let declarations = node
        .namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .filter(|ns| {
            parent.map_or(true, |p| {
                !p.namespaces()
                    .any(|outer| outer.name() == ns.name() && outer.uri() == ns.uri())
            })
        })
        .map(|ns| NamespaceDeclaration {
            prefix: ns.name(),
            uri: ns.uri(),
        })
        .collect();

    let attributes = node
        .attributes()
        .map(|attr| ViewAttribute {
            namespace_uri: attr.namespace().filter(|uri| !uri.is_empty()),
            name: attr.name(),
            value: attr.value(),
        })
        .collect();

    ViewElement {
        namespace_uri: node.tag_name().namespace().filter(|uri| !uri.is_empty()),
        local_name: node.tag_name().name(),
        declarations,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_view_splits_declarations() {
        let mut arena = DomArena::new();
        let el = arena.create_element_ns("urn:x", "el");
        let _ = arena.set_attribute(el, "xmlns", "urn:x");
        let _ = arena.set_attribute(el, "xmlns:y", "urn:y");
        let _ = arena.set_attribute(el, "id", "1");

        let ViewNode::Element(view) = arena.node(el).unwrap() else {
            panic!("expected element");
        };
        assert_eq!(view.local_name, "el");
        assert_eq!(
            view.declarations,
            vec![
                NamespaceDeclaration { prefix: None, uri: "urn:x" },
                NamespaceDeclaration { prefix: Some("y"), uri: "urn:y" },
            ]
        );
        assert_eq!(view.attributes.len(), 1);
        assert_eq!(view.attributes[0].name, "id");
    }

    #[test]
    fn test_external_view_reports_new_declarations_only() {
        let doc = roxmltree::Document::parse(
            r#"<a xmlns="urn:a" xmlns:p="urn:p"><p:b p:attr="v"><c xmlns:q="urn:q"/></p:b></a>"#,
        )
        .unwrap();
        let a = doc.root_element();
        let b = a.first_element_child().unwrap();
        let c = b.first_element_child().unwrap();

        let ViewNode::Element(a_view) = doc.node(a.id()).unwrap() else {
            panic!("expected element");
        };
        assert_eq!(a_view.declarations.len(), 2);

        let ViewNode::Element(b_view) = doc.node(b.id()).unwrap() else {
            panic!("expected element");
        };
        assert!(b_view.declarations.is_empty());
        assert_eq!(b_view.namespace_uri, Some("urn:p"));
        assert_eq!(b_view.attributes[0].namespace_uri, Some("urn:p"));

        let ViewNode::Element(c_view) = doc.node(c.id()).unwrap() else {
            panic!("expected element");
        };
        assert_eq!(
            c_view.declarations,
            vec![NamespaceDeclaration { prefix: Some("q"), uri: "urn:q" }]
        );
    }

    #[test]
    fn test_external_view_undeclared_default_has_no_namespace() {
        let doc = roxmltree::Document::parse(r#"<a xmlns="urn:a"><b xmlns=""/></a>"#).unwrap();
        let b = doc.root_element().first_element_child().unwrap();

        let ViewNode::Element(b_view) = doc.node(b.id()).unwrap() else {
            panic!("expected element");
        };
        assert_eq!(b_view.namespace_uri, None);
        assert_eq!(
            b_view.declarations,
            vec![NamespaceDeclaration { prefix: None, uri: "" }]
        );
    }
}
