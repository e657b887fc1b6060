//! Error types for tree, event and serializer operations
//!
//! Simple, flat error hierarchy. Structure and unsupported-operation errors
//! are programmer errors: they are returned immediately, never recovered.

use crate::types::{NodeId, NodeType};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Structure error: {0}")]
    Structure(String),

    #[error("Unsupported operation '{operation}' on {node_type} node")]
    UnsupportedOperation {
        node_type: NodeType,
        operation: &'static str,
    },

    #[error("Index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Tree structure of node {node} changed while an event was dispatched")]
    ConcurrentModification { node: NodeId },

    #[error("Character U+{codepoint:04X} is not allowed in XML output")]
    InvalidCharacter { codepoint: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DomError {
    pub(crate) fn structure(message: impl Into<String>) -> Self {
        DomError::Structure(message.into())
    }
}
