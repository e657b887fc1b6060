//! Core type definitions for the micro document tree
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. One tagged enum per node payload, matched exhaustively
//! 3. Use SmallVec for child lists (most nodes have few children)

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Node identifier (index into arena)
pub type NodeId = u32;

/// Child list of a node. Leaves keep it empty forever.
pub type ChildIds = SmallVec<[NodeId; 4]>;

/// Node type discriminant, numbered like the W3C DOM where one exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    Container = 11,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            5 => Some(NodeType::EntityReference),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::Container),
            _ => None,
        }
    }

    /// Whether nodes of this type own a child list
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            NodeType::Document | NodeType::Element | NodeType::Container
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Element => "element",
            NodeType::Text => "text",
            NodeType::CdataSection => "CDATA",
            NodeType::EntityReference => "entity reference",
            NodeType::ProcessingInstruction => "processing instruction",
            NodeType::Comment => "comment",
            NodeType::Document => "document",
            NodeType::DocumentType => "document type",
            NodeType::Container => "container",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an update that may or may not have modified anything
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        self == Change::Changed
    }

    pub fn is_unchanged(self) -> bool {
        self == Change::Unchanged
    }

    pub(crate) fn from_bool(changed: bool) -> Self {
        if changed {
            Change::Changed
        } else {
            Change::Unchanged
        }
    }
}

/// Element attributes: unique names, insertion order kept for output.
///
/// Equality ignores order, since attributes form a mapping.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or overwrite a value
    pub fn set(&mut self, name: &str, value: &str) -> Change {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) if existing == value => Change::Unchanged,
            Some((_, existing)) => {
                *existing = value.to_string();
                Change::Changed
            }
            None => {
                self.entries.push((name.to_string(), value.to_string()));
                Change::Changed
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Change {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| key != name);
        Change::from_bool(self.entries.len() != before)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(name, value)| other.get(name) == Some(value.as_str()))
    }
}

impl Eq for Attributes {}

/// Element payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub(crate) namespace_uri: Option<String>,
    pub(crate) tag_name: String,
    pub(crate) attributes: Attributes,
}

impl ElementData {
    /// Create element data. A `prefix:` on the tag name is stripped when a
    /// namespace URI is supplied.
    pub fn new(namespace_uri: Option<&str>, tag_name: &str) -> Self {
        let namespace_uri = namespace_uri.filter(|uri| !uri.is_empty());
        let tag_name = match (namespace_uri, tag_name.split_once(':')) {
            (Some(_), Some((prefix, local))) => {
                tracing::debug!("Dropping prefix '{}' from element '{}'", prefix, tag_name);
                local
            }
            _ => tag_name,
        };

        Self {
            namespace_uri: namespace_uri.map(String::from),
            tag_name: tag_name.to_string(),
            attributes: Attributes::new(),
        }
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_uri.as_deref()
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Local-name match, plus namespace match when `namespace_uri` is non-empty
    pub fn matches(&self, namespace_uri: Option<&str>, local_name: &str) -> bool {
        if self.tag_name != local_name {
            return false;
        }
        match namespace_uri.filter(|uri| !uri.is_empty()) {
            Some(uri) => self.namespace_uri() == Some(uri),
            None => true,
        }
    }
}

/// Document type declaration payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocType {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// Node payload, one variant per node type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentType(DocType),
    Element(ElementData),
    Container,
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: Option<String> },
    EntityReference(String),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Document => NodeType::Document,
            NodeKind::DocumentType(_) => NodeType::DocumentType,
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Container => NodeType::Container,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::CData(_) => NodeType::CdataSection,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            NodeKind::EntityReference(_) => NodeType::EntityReference,
        }
    }
}

/// A tree node stored in the arena
#[derive(Debug, Clone)]
pub struct DomNode {
    pub(crate) node_id: NodeId,
    pub(crate) parent_id: Option<NodeId>,
    pub(crate) children_ids: ChildIds,
    pub(crate) kind: NodeKind,
}

impl DomNode {
    pub(crate) fn new(node_id: NodeId, kind: NodeKind) -> Self {
        Self {
            node_id,
            parent_id: None,
            children_ids: ChildIds::new(),
            kind,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    /// Get element data if this is an element
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Character data of text-like leaves
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::CData(text) | NodeKind::Comment(text) => Some(text),
            _ => None,
        }
    }
}
