//! Arena-based document tree storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! Every node lives in one `Vec` slot and is addressed by a 4-byte index.
//! Parent and child links are indices too, so the single-parent invariant is
//! maintained in exactly one place: the `link`/`unlink` pair below.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Option<DomNode>>
//!        [Node0][Node1][None][Node3]...
//!         ↑ released slots stay empty, ids are never reused
//! ```

use crate::error::{DomError, Result};
use crate::types::{Change, DocType, DomNode, ElementData, NodeId, NodeKind, NodeType};

/// Id for the slot at `len`, if it still fits a `NodeId`
fn next_node_id(len: usize) -> Option<NodeId> {
    NodeId::try_from(len).ok()
}

/// Arena allocator and owner of one or more node trees
///
/// Design:
/// - Single Vec for sequential allocation
/// - Detached subtrees are legal; `release` drops them
/// - A structure generation counter changes on every child-list mutation
#[derive(Debug, Clone, Default)]
pub struct DomArena {
    /// All nodes, `None` once released
    nodes: Vec<Option<DomNode>>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,

    /// Bumped by every structural mutation
    generation: u64,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root_id: None,
            generation: 0,
        }
    }

    /// Add a detached node to the arena, returns its ID
    ///
    /// # Panics
    ///
    /// Ids are never reused, so an arena holds at most `u32::MAX + 1` nodes
    /// over its lifetime. Adding one more panics, like `Vec` on capacity
    /// overflow.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let Some(node_id) = next_node_id(self.nodes.len()) else {
            panic!("DomArena node id space exhausted");
        };
        self.nodes.push(Some(DomNode::new(node_id, kind)));
        node_id
    }

    pub fn create_document(&mut self) -> NodeId {
        self.add_node(NodeKind::Document)
    }

    pub fn create_doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> NodeId {
        self.add_node(NodeKind::DocumentType(DocType {
            name: name.to_string(),
            public_id: public_id.map(String::from),
            system_id: system_id.map(String::from),
        }))
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.add_node(NodeKind::Element(ElementData::new(None, tag_name)))
    }

    /// Create a namespaced element; a prefix on `tag_name` is dropped
    pub fn create_element_ns(&mut self, namespace_uri: &str, tag_name: &str) -> NodeId {
        self.add_node(NodeKind::Element(ElementData::new(
            Some(namespace_uri),
            tag_name,
        )))
    }

    pub fn create_container(&mut self) -> NodeId {
        self.add_node(NodeKind::Container)
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.add_node(NodeKind::Text(text.to_string()))
    }

    pub fn create_cdata(&mut self, text: &str) -> NodeId {
        self.add_node(NodeKind::CData(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.add_node(NodeKind::Comment(text.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: Option<&str>) -> NodeId {
        self.add_node(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.map(String::from),
        })
    }

    pub fn create_entity_reference(&mut self, name: &str) -> NodeId {
        self.add_node(NodeKind::EntityReference(name.to_string()))
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .and_then(Option::as_ref)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable). Links are not reachable from outside the crate.
    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .and_then(Option::as_mut)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    pub fn node_type(&self, node_id: NodeId) -> Result<NodeType> {
        Ok(self.get(node_id)?.node_type())
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Structure generation; changes whenever any child list changes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterator over all live nodes
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter().flatten()
    }

    /// Iterator over all live node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|node| node.node_id)
    }

    pub fn parent(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent_id)
    }

    /// Direct children. Containers are returned as themselves.
    pub fn children(&self, node_id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.get(node_id)?.children_ids)
    }

    pub fn child_count(&self, node_id: NodeId) -> Result<usize> {
        Ok(self.children(node_id)?.len())
    }

    pub fn has_children(&self, node_id: NodeId) -> Result<bool> {
        Ok(!self.children(node_id)?.is_empty())
    }

    pub fn first_child(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.children(node_id)?.first().copied())
    }

    pub fn last_child(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.children(node_id)?.last().copied())
    }

    pub fn child_at(&self, node_id: NodeId, index: usize) -> Result<Option<NodeId>> {
        Ok(self.children(node_id)?.get(index).copied())
    }

    /// Position of a node inside its parent's child list.
    ///
    /// A parent link without the matching child entry is a broken tree and
    /// reported as a structure error.
    fn index_in_parent(&self, node_id: NodeId) -> Result<Option<(NodeId, usize)>> {
        let Some(parent_id) = self.get(node_id)?.parent_id else {
            return Ok(None);
        };
        let index = self
            .children(parent_id)?
            .iter()
            .position(|&child| child == node_id)
            .ok_or_else(|| {
                DomError::structure(format!(
                    "node {} claims parent {} but is not among its children",
                    node_id, parent_id
                ))
            })?;
        Ok(Some((parent_id, index)))
    }

    pub fn previous_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        match self.index_in_parent(node_id)? {
            Some((parent_id, index)) if index > 0 => self.child_at(parent_id, index - 1),
            _ => Ok(None),
        }
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        match self.index_in_parent(node_id)? {
            Some((parent_id, index)) => self.child_at(parent_id, index + 1),
            None => Ok(None),
        }
    }

    /// True if `ancestor` is `node_id` itself or lies on its parent chain
    pub fn is_ancestor_of(&self, ancestor: NodeId, node_id: NodeId) -> Result<bool> {
        let mut current = Some(node_id);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.get(id)?.parent_id;
        }
        Ok(false)
    }

    /// Single choke point rejecting child management on leaves
    fn check_branch(&self, node_id: NodeId, operation: &'static str) -> Result<()> {
        let node_type = self.node_type(node_id)?;
        if node_type.is_branch() {
            Ok(())
        } else {
            Err(DomError::UnsupportedOperation {
                node_type,
                operation,
            })
        }
    }

    /// Every pre-condition of attaching `child` under `parent`, checked
    /// before anything is touched
    fn check_attachable(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
        operation: &'static str,
    ) -> Result<()> {
        self.check_branch(parent_id, operation)?;
        let child = self.get(child_id)?;

        if child_id == parent_id {
            return Err(DomError::structure(format!(
                "cannot attach node {} to itself",
                child_id
            )));
        }
        if let Some(current_parent) = child.parent_id {
            return Err(DomError::structure(format!(
                "node {} already has parent {}; detach it first",
                child_id, current_parent
            )));
        }
        if child.node_type() == NodeType::Document {
            return Err(DomError::structure(format!(
                "document node {} cannot become a child",
                child_id
            )));
        }
        if self.is_ancestor_of(child_id, parent_id)? {
            return Err(DomError::structure(format!(
                "node {} is an ancestor of {}",
                child_id, parent_id
            )));
        }
        Ok(())
    }

    fn position_of_child(&self, parent_id: NodeId, child_id: NodeId) -> Result<usize> {
        self.children(parent_id)?
            .iter()
            .position(|&id| id == child_id)
            .ok_or_else(|| {
                DomError::structure(format!(
                    "node {} is not a child of {}",
                    child_id, parent_id
                ))
            })
    }

    fn link(&mut self, parent_id: NodeId, index: usize, child_id: NodeId) -> Result<()> {
        self.get_mut(parent_id)?.children_ids.insert(index, child_id);
        self.get_mut(child_id)?.parent_id = Some(parent_id);
        self.generation += 1;
        Ok(())
    }

    fn unlink(&mut self, parent_id: NodeId, index: usize) -> Result<NodeId> {
        let child_id = self.get_mut(parent_id)?.children_ids.remove(index);
        self.get_mut(child_id)?.parent_id = None;
        self.generation += 1;
        Ok(child_id)
    }

    pub fn append_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<NodeId> {
        self.check_attachable(parent_id, child_id, "append_child")?;
        let index = self.child_count(parent_id)?;
        self.link(parent_id, index, child_id)?;
        Ok(child_id)
    }

    /// Insert `child_id` directly before `successor`, a child of `parent_id`
    pub fn insert_before(
        &mut self,
        parent_id: NodeId,
        child_id: NodeId,
        successor: NodeId,
    ) -> Result<NodeId> {
        self.check_attachable(parent_id, child_id, "insert_before")?;
        let index = self.position_of_child(parent_id, successor)?;
        self.link(parent_id, index, child_id)?;
        Ok(child_id)
    }

    /// Insert `child_id` directly after `predecessor`, a child of `parent_id`
    pub fn insert_after(
        &mut self,
        parent_id: NodeId,
        child_id: NodeId,
        predecessor: NodeId,
    ) -> Result<NodeId> {
        self.check_attachable(parent_id, child_id, "insert_after")?;
        let index = self.position_of_child(parent_id, predecessor)?;
        self.link(parent_id, index + 1, child_id)?;
        Ok(child_id)
    }

    pub fn insert_at_index(
        &mut self,
        parent_id: NodeId,
        index: usize,
        child_id: NodeId,
    ) -> Result<NodeId> {
        self.check_attachable(parent_id, child_id, "insert_at_index")?;
        let len = self.child_count(parent_id)?;
        if index > len {
            return Err(DomError::IndexOutOfBounds { index, len });
        }
        self.link(parent_id, index, child_id)?;
        Ok(child_id)
    }

    /// Remove a direct child. Nodes that are not children are left alone.
    pub fn remove_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<Change> {
        self.check_branch(parent_id, "remove_child")?;
        match self.children(parent_id)?.iter().position(|&id| id == child_id) {
            Some(index) => {
                self.unlink(parent_id, index)?;
                Ok(Change::Changed)
            }
            None => Ok(Change::Unchanged),
        }
    }

    pub fn remove_child_at_index(&mut self, parent_id: NodeId, index: usize) -> Result<Change> {
        self.check_branch(parent_id, "remove_child_at_index")?;
        if index >= self.child_count(parent_id)? {
            return Ok(Change::Unchanged);
        }
        self.unlink(parent_id, index)?;
        Ok(Change::Changed)
    }

    pub fn remove_all_children(&mut self, parent_id: NodeId) -> Result<Change> {
        self.check_branch(parent_id, "remove_all_children")?;
        let children = std::mem::take(&mut self.get_mut(parent_id)?.children_ids);
        if children.is_empty() {
            return Ok(Change::Unchanged);
        }
        for child_id in children {
            self.get_mut(child_id)?.parent_id = None;
        }
        self.generation += 1;
        Ok(Change::Changed)
    }

    /// Put `new_child` where `old_child` is. Replacing a node with itself is a
    /// no-op; a failed insertion leaves `old_child` in place.
    pub fn replace_child(
        &mut self,
        parent_id: NodeId,
        old_child: NodeId,
        new_child: NodeId,
    ) -> Result<Change> {
        self.check_branch(parent_id, "replace_child")?;
        if old_child == new_child {
            return Ok(Change::Unchanged);
        }
        self.insert_before(parent_id, new_child, old_child)?;
        self.remove_child(parent_id, old_child)
    }

    pub fn detach_from_parent(&mut self, node_id: NodeId) -> Result<Change> {
        match self.index_in_parent(node_id)? {
            Some((parent_id, index)) => {
                self.unlink(parent_id, index)?;
                Ok(Change::Changed)
            }
            None => Ok(Change::Unchanged),
        }
    }

    /// Deep copy of a subtree. The copy is detached and shares no node with
    /// the original.
    pub fn clone_subtree(&mut self, node_id: NodeId) -> Result<NodeId> {
        let (kind, children) = {
            let node = self.get(node_id)?;
            (node.kind.clone(), node.children_ids.clone())
        };

        let copy_id = self.add_node(kind);
        for child_id in children {
            let child_copy = self.clone_subtree(child_id)?;
            self.get_mut(copy_id)?.children_ids.push(child_copy);
            self.get_mut(child_copy)?.parent_id = Some(copy_id);
        }
        Ok(copy_id)
    }

    /// Structural equality of two subtrees in this arena
    pub fn is_equal_content(&self, a: NodeId, b: NodeId) -> Result<bool> {
        self.content_equals(a, self, b)
    }

    /// Structural equality against a subtree of another arena. Identity and
    /// parent links are ignored.
    pub fn content_equals(&self, a: NodeId, other: &DomArena, b: NodeId) -> Result<bool> {
        let left = self.get(a)?;
        let right = other.get(b)?;

        if left.kind != right.kind || left.children_ids.len() != right.children_ids.len() {
            return Ok(false);
        }
        for (&l, &r) in left.children_ids.iter().zip(right.children_ids.iter()) {
            if !self.content_equals(l, other, r)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop a detached subtree. Returns the released IDs so that observers
    /// keyed by node can forget them.
    pub fn release(&mut self, node_id: NodeId) -> Result<Vec<NodeId>> {
        if let Some(parent_id) = self.get(node_id)?.parent_id {
            return Err(DomError::structure(format!(
                "node {} is still attached to {}; detach before release",
                node_id, parent_id
            )));
        }

        let mut released = Vec::new();
        self.traverse_df(node_id, |node| {
            released.push(node.node_id);
            Ok(())
        })?;
        for &id in &released {
            self.nodes[id as usize] = None;
        }
        if self.root_id == Some(node_id) {
            self.root_id = None;
        }
        Ok(released)
    }

    /// Replace the payload of a text, CDATA or comment node
    pub fn set_text(&mut self, node_id: NodeId, text: &str) -> Result<Change> {
        let node = self.get_mut(node_id)?;
        match &mut node.kind {
            NodeKind::Text(current) | NodeKind::CData(current) | NodeKind::Comment(current) => {
                if current == text {
                    Ok(Change::Unchanged)
                } else {
                    *current = text.to_string();
                    Ok(Change::Changed)
                }
            }
            other => Err(DomError::UnsupportedOperation {
                node_type: other.node_type(),
                operation: "set_text",
            }),
        }
    }

    /// Traverse tree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Find live nodes matching predicate, in allocation order
    pub fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&DomNode) -> bool,
    {
        self.iter()
            .filter(|node| predicate(node))
            .map(|node| node.node_id)
            .collect()
    }

    /// Find all elements with the given local tag name, attached or not
    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.find(|node| node.as_element().is_some_and(|e| e.tag_name() == tag))
    }

    /// Clear arena (reuse allocation)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root_id = None;
        self.generation += 1;
    }
}
