//! Error types for reading documents

use microdom::DomError;
use thiserror::Error;

use crate::handlers::ParseMessage;

pub type Result<T> = std::result::Result<T, ReadError>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot decode '{system_id}': {message}")]
    Encoding { system_id: String, message: String },

    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    /// Parsing failed; no tree is produced
    #[error("Parse failed: {}", first_fatal(.messages))]
    Fatal { messages: Vec<ParseMessage> },

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error("Invalid property '{key}': {message}")]
    InvalidProperty { key: String, message: String },
}

fn first_fatal(messages: &[ParseMessage]) -> String {
    messages
        .iter()
        .find(|m| m.is_fatal())
        .or_else(|| messages.first())
        .map_or_else(|| "no diagnostics".to_string(), ToString::to_string)
}

impl ReadError {
    pub(crate) fn encoding(system_id: &str, message: impl Into<String>) -> Self {
        ReadError::Encoding {
            system_id: system_id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_property(key: &str, message: impl Into<String>) -> Self {
        ReadError::InvalidProperty {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
