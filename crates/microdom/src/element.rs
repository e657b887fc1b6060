//! Element accessors and element queries
//!
//! The child-element queries here look *through* container nodes: a
//! container child is inspected as if its own children were direct children
//! of the element. Only these queries do that; `DomArena::children` and the
//! other navigation methods return containers as they are.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{Attributes, Change, ElementData, NodeId, NodeKind};

impl DomArena {
    fn element(&self, node_id: NodeId) -> Result<&ElementData> {
        let node = self.get(node_id)?;
        node.as_element().ok_or(DomError::UnsupportedOperation {
            node_type: node.node_type(),
            operation: "element access",
        })
    }

    fn element_mut(&mut self, node_id: NodeId) -> Result<&mut ElementData> {
        let node = self.get_mut(node_id)?;
        match &mut node.kind {
            NodeKind::Element(element) => Ok(element),
            other => Err(DomError::UnsupportedOperation {
                node_type: other.node_type(),
                operation: "element access",
            }),
        }
    }

    pub fn tag_name(&self, node_id: NodeId) -> Result<&str> {
        Ok(self.element(node_id)?.tag_name())
    }

    pub fn namespace_uri(&self, node_id: NodeId) -> Result<Option<&str>> {
        Ok(self.element(node_id)?.namespace_uri())
    }

    /// Set or clear the namespace URI. An empty string clears it.
    pub fn set_namespace_uri(&mut self, node_id: NodeId, uri: Option<&str>) -> Result<Change> {
        let element = self.element_mut(node_id)?;
        let uri = uri.filter(|u| !u.is_empty());
        if element.namespace_uri.as_deref() == uri {
            return Ok(Change::Unchanged);
        }
        element.namespace_uri = uri.map(String::from);
        Ok(Change::Changed)
    }

    pub fn attribute(&self, node_id: NodeId, name: &str) -> Result<Option<&str>> {
        Ok(self.element(node_id)?.attributes.get(name))
    }

    pub fn has_attribute(&self, node_id: NodeId, name: &str) -> Result<bool> {
        Ok(self.element(node_id)?.attributes.contains(name))
    }

    pub fn attributes(&self, node_id: NodeId) -> Result<&Attributes> {
        Ok(&self.element(node_id)?.attributes)
    }

    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<Change> {
        Ok(self.element_mut(node_id)?.attributes.set(name, value))
    }

    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<Change> {
        Ok(self.element_mut(node_id)?.attributes.remove(name))
    }

    /// Append a new text node and return it
    pub fn append_text(&mut self, node_id: NodeId, text: &str) -> Result<NodeId> {
        let text_id = self.create_text(text);
        self.append_child(node_id, text_id)
    }

    /// Concatenated text and CDATA content of the whole subtree
    pub fn text_content(&self, node_id: NodeId) -> Result<String> {
        let mut text = String::new();
        self.traverse_df(node_id, |node| {
            if let NodeKind::Text(t) | NodeKind::CData(t) = &node.kind {
                text.push_str(t);
            }
            Ok(())
        })?;
        Ok(text)
    }

    /// Walk the element children of `node_id`, looking through containers.
    /// Stops early when `visit` returns `false`.
    fn visit_child_elements<F>(&self, node_id: NodeId, visit: &mut F) -> Result<bool>
    where
        F: FnMut(NodeId, &ElementData) -> bool,
    {
        for &child_id in self.children(node_id)? {
            let child = self.get(child_id)?;
            match &child.kind {
                NodeKind::Element(element) => {
                    if !visit(child_id, element) {
                        return Ok(false);
                    }
                }
                NodeKind::Container => {
                    if !self.visit_child_elements(child_id, visit)? {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }

    fn collect_child_elements(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: Option<&str>,
    ) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.visit_child_elements(node_id, &mut |id, element| {
            if local_name.map_or(true, |name| element.matches(namespace_uri, name)) {
                found.push(id);
            }
            true
        })?;
        Ok(found)
    }

    fn first_matching_child(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: Option<&str>,
    ) -> Result<Option<NodeId>> {
        let mut found = None;
        self.visit_child_elements(node_id, &mut |id, element| {
            if local_name.map_or(true, |name| element.matches(namespace_uri, name)) {
                found = Some(id);
                return false;
            }
            true
        })?;
        Ok(found)
    }

    /// All child elements, including those inside container children
    pub fn child_elements(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        self.collect_child_elements(node_id, None, None)
    }

    pub fn child_elements_named(&self, node_id: NodeId, local_name: &str) -> Result<Vec<NodeId>> {
        self.collect_child_elements(node_id, None, Some(local_name))
    }

    /// Namespace-aware variant; an empty or absent URI matches by local name only
    pub fn child_elements_ns(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<Vec<NodeId>> {
        self.collect_child_elements(node_id, namespace_uri, Some(local_name))
    }

    pub fn first_child_element(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        self.first_matching_child(node_id, None, None)
    }

    pub fn first_child_element_named(
        &self,
        node_id: NodeId,
        local_name: &str,
    ) -> Result<Option<NodeId>> {
        self.first_matching_child(node_id, None, Some(local_name))
    }

    pub fn first_child_element_ns(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<Option<NodeId>> {
        self.first_matching_child(node_id, namespace_uri, Some(local_name))
    }

    pub fn has_child_elements(&self, node_id: NodeId) -> Result<bool> {
        Ok(self.first_child_element(node_id)?.is_some())
    }

    pub fn has_child_elements_named(&self, node_id: NodeId, local_name: &str) -> Result<bool> {
        Ok(self.first_child_element_named(node_id, local_name)?.is_some())
    }

    pub fn has_child_elements_ns(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<bool> {
        Ok(self
            .first_child_element_ns(node_id, namespace_uri, local_name)?
            .is_some())
    }

    fn collect_descendants(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: Option<&str>,
        found: &mut Vec<NodeId>,
    ) -> Result<()> {
        for child_id in self.child_elements(node_id)? {
            let element = self.element(child_id)?;
            if local_name.map_or(true, |name| element.matches(namespace_uri, name)) {
                found.push(child_id);
            }
            self.collect_descendants(child_id, namespace_uri, local_name, found)?;
        }
        Ok(())
    }

    /// All descendant elements in document order, looking through containers
    pub fn descendant_elements(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.collect_descendants(node_id, None, None, &mut found)?;
        Ok(found)
    }

    pub fn descendant_elements_named(
        &self,
        node_id: NodeId,
        local_name: &str,
    ) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.collect_descendants(node_id, None, Some(local_name), &mut found)?;
        Ok(found)
    }

    pub fn descendant_elements_ns(
        &self,
        node_id: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.collect_descendants(node_id, namespace_uri, Some(local_name), &mut found)?;
        Ok(found)
    }
}
