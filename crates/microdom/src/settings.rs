//! Writer settings
//!
//! Every flag is independent. Settings load from JSON with missing fields
//! taking their defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::namespace::NamespaceContext;

/// Escaping and empty-element rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializeProfile {
    #[default]
    Xml,
    Html,
}

/// Output character encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputEncoding {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "US-ASCII")]
    Ascii,
    #[serde(rename = "ISO-8859-1")]
    Latin1,
}

impl OutputEncoding {
    pub fn name(self) -> &'static str {
        match self {
            OutputEncoding::Utf8 => "UTF-8",
            OutputEncoding::Ascii => "US-ASCII",
            OutputEncoding::Latin1 => "ISO-8859-1",
        }
    }

    pub fn can_encode(self, c: char) -> bool {
        match self {
            OutputEncoding::Utf8 => true,
            OutputEncoding::Ascii => c.is_ascii(),
            OutputEncoding::Latin1 => (c as u32) <= 0xFF,
        }
    }

    /// Encode serialized text. Characters outside the encoding only remain
    /// when the incorrect-character policy writes them as is; they become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            OutputEncoding::Utf8 => text.as_bytes().to_vec(),
            OutputEncoding::Ascii | OutputEncoding::Latin1 => text
                .chars()
                .map(|c| if self.can_encode(c) { c as u32 as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// What to do with characters that may not appear in XML at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncorrectCharacterPolicy {
    WriteAsIs,
    #[default]
    DropWithLog,
    Fail,
}

/// Serializer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub profile: SerializeProfile,
    pub encoding: OutputEncoding,
    pub emit_xml_declaration: bool,
    pub emit_doc_type: bool,
    pub emit_comments: bool,
    pub indent: bool,
    pub emit_namespaces: bool,
    pub space_on_self_closed_element: bool,
    pub incorrect_characters: IncorrectCharacterPolicy,
    pub newline: String,
    pub namespace_context: Option<NamespaceContext>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            profile: SerializeProfile::Xml,
            encoding: OutputEncoding::Utf8,
            emit_xml_declaration: true,
            emit_doc_type: true,
            emit_comments: true,
            indent: true,
            emit_namespaces: true,
            space_on_self_closed_element: false,
            incorrect_characters: IncorrectCharacterPolicy::DropWithLog,
            newline: "\n".to_string(),
            namespace_context: None,
        }
    }
}

impl WriterSettings {
    /// Compact single-line output without XML declaration
    pub fn compact() -> Self {
        Self {
            emit_xml_declaration: false,
            indent: false,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_profile(mut self, profile: SerializeProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_xml_declaration(mut self, emit: bool) -> Self {
        self.emit_xml_declaration = emit;
        self
    }

    pub fn with_doc_type(mut self, emit: bool) -> Self {
        self.emit_doc_type = emit;
        self
    }

    pub fn with_comments(mut self, emit: bool) -> Self {
        self.emit_comments = emit;
        self
    }

    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_namespaces(mut self, emit: bool) -> Self {
        self.emit_namespaces = emit;
        self
    }

    pub fn with_space_on_self_closed_element(mut self, space: bool) -> Self {
        self.space_on_self_closed_element = space;
        self
    }

    pub fn with_incorrect_characters(mut self, policy: IncorrectCharacterPolicy) -> Self {
        self.incorrect_characters = policy;
        self
    }

    pub fn with_namespace_context(mut self, context: NamespaceContext) -> Self {
        self.namespace_context = Some(context);
        self
    }
}
