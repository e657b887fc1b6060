//! Lightweight XML DOM
//!
//! Arena-backed node tree with namespace-aware serialization.
//!
//! ## Core Design
//!
//! ```text
//! DomArena (owned nodes) ──┐
//!                          ├─→ TreeView → XmlSerializer → String / bytes
//! roxmltree::Document ─────┘        ↑
//!                            NamespaceStack (prefix resolution)
//! ```
//!
//! - Nodes are addressed by `NodeId` (u32) and never reused within an arena
//! - Leaf nodes (text, comment, ...) reject every child operation
//! - Containers group children without producing markup of their own
//! - Mutations report `Change::Changed` / `Change::Unchanged`
//! - Event targets live in an `EventRegistry` next to the arena

pub mod arena;
pub mod element;
pub mod error;
pub mod events;
pub mod namespace;
pub mod serializer;
pub mod settings;
pub mod types;
pub mod view;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use events::{DomEvent, EventRegistry, EventTarget, EventTargetHandle, EventType};
pub use namespace::{NamespaceContext, NamespaceStack};
pub use serializer::XmlSerializer;
pub use settings::{IncorrectCharacterPolicy, OutputEncoding, SerializeProfile, WriterSettings};
pub use types::*;
pub use view::{TreeView, ViewNode};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_serialize() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        arena.set_root(doc).unwrap();
        let root = arena.create_element_ns("urn:books", "library");
        let _ = arena.set_attribute(root, "xmlns", "urn:books");
        arena.append_child(doc, root).unwrap();
        let book = arena.create_element_ns("urn:books", "book");
        let _ = arena.set_attribute(book, "id", "1");
        arena.append_child(root, book).unwrap();
        arena.append_text(book, "Dune").unwrap();

        let xml = XmlSerializer::new().serialize_document(&arena).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <library xmlns=\"urn:books\">\n  <book id=\"1\">Dune</book>\n</library>\n"
        );
    }
}
