//! Content events and the tree builder that turns them into a `DomArena`

use microdom::{DomArena, DomError, NodeId, NodeKind};

use crate::error::{ReadError, Result};

/// Start tag as reported by a parser engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartElement<'a> {
    pub namespace_uri: Option<&'a str>,
    /// Local name, or the qualified name when parsing without namespaces
    pub name: &'a str,
    /// Qualified attribute names, namespace declarations included
    pub attributes: Vec<(String, &'a str)>,
}

/// Receiver of parse events, in document order
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<()>;

    fn doctype(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Result<()>;

    fn start_element(&mut self, element: &StartElement<'_>) -> Result<()>;

    fn end_element(&mut self) -> Result<()>;

    fn characters(&mut self, text: &str) -> Result<()>;

    fn comment(&mut self, text: &str) -> Result<()>;

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()>;

    fn end_document(&mut self) -> Result<()>;
}

/// Builds a tree rooted at a Document node
#[derive(Debug, Default)]
pub struct TreeBuilder {
    arena: DomArena,
    open: Vec<NodeId>,
    finished: bool,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the finished tree
    pub fn finish(self) -> Result<DomArena> {
        if !self.finished {
            return Err(ReadError::Dom(DomError::Structure(
                "document is incomplete".to_string(),
            )));
        }
        Ok(self.arena)
    }

    fn current(&self) -> Result<NodeId> {
        self.open.last().copied().ok_or_else(|| {
            ReadError::Dom(DomError::Structure(
                "content outside of the document".to_string(),
            ))
        })
    }

    fn append(&mut self, node_id: NodeId) -> Result<()> {
        let parent_id = self.current()?;
        self.arena.append_child(parent_id, node_id)?;
        Ok(())
    }
}

impl ContentHandler for TreeBuilder {
    fn start_document(&mut self) -> Result<()> {
        let document = self.arena.create_document();
        self.arena.set_root(document)?;
        self.open.push(document);
        Ok(())
    }

    fn doctype(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Result<()> {
        let doctype = self.arena.create_doctype(name, public_id, system_id);
        self.append(doctype)
    }

    fn start_element(&mut self, element: &StartElement<'_>) -> Result<()> {
        let node_id = match element.namespace_uri {
            Some(uri) => self.arena.create_element_ns(uri, element.name),
            None => self.arena.create_element(element.name),
        };
        for (name, value) in &element.attributes {
            let _ = self.arena.set_attribute(node_id, name, value)?;
        }
        self.append(node_id)?;
        self.open.push(node_id);
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        self.current()?;
        self.open.pop();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        let parent_id = self.current()?;
        // Adjacent character events end up in one text node
        if let Some(last) = self.arena.last_child(parent_id)? {
            if let NodeKind::Text(existing) = self.arena.get(last)?.kind() {
                let merged = format!("{}{}", existing, text);
                let _ = self.arena.set_text(last, &merged)?;
                return Ok(());
            }
        }
        let text_id = self.arena.create_text(text);
        self.append(text_id)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        let comment = self.arena.create_comment(text);
        self.append(comment)
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()> {
        let pi = self.arena.create_processing_instruction(target, data);
        self.append(pi)
    }

    fn end_document(&mut self) -> Result<()> {
        self.open.pop();
        if !self.open.is_empty() {
            return Err(ReadError::Dom(DomError::Structure(format!(
                "{} element(s) left open at end of document",
                self.open.len()
            ))));
        }
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_document() {
        let mut builder = TreeBuilder::new();
        builder.start_document().unwrap();
        builder.doctype("note", None, Some("note.dtd")).unwrap();
        builder
            .start_element(&StartElement {
                namespace_uri: Some("urn:notes"),
                name: "note",
                attributes: vec![("xmlns".to_string(), "urn:notes")],
            })
            .unwrap();
        builder.characters("Hello").unwrap();
        builder.characters(", world").unwrap();
        builder.comment(" done ").unwrap();
        builder.end_element().unwrap();
        builder.end_document().unwrap();

        let arena = builder.finish().unwrap();
        let doc = arena.root_id().unwrap();
        assert_eq!(arena.child_count(doc).unwrap(), 2);
        let note = arena.first_child_element(doc).unwrap().unwrap();
        assert_eq!(arena.namespace_uri(note).unwrap(), Some("urn:notes"));
        assert_eq!(arena.attribute(note, "xmlns").unwrap(), Some("urn:notes"));
        assert_eq!(arena.child_count(note).unwrap(), 2);
        assert_eq!(arena.text_content(note).unwrap(), "Hello, world");
    }

    #[test]
    fn test_unfinished_document_is_rejected() {
        let mut builder = TreeBuilder::new();
        builder.start_document().unwrap();
        builder
            .start_element(&StartElement {
                namespace_uri: None,
                name: "open",
                attributes: Vec::new(),
            })
            .unwrap();
        assert!(builder.end_document().is_err());
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_content_before_document_is_rejected() {
        let mut builder = TreeBuilder::new();
        assert!(builder.characters("stray").is_err());
    }
}
