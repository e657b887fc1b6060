//! Input sources
//!
//! Every source is normalized to a `ResolvedInput` holding the decoded text
//! before it reaches a parser engine.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{ReadError, Result};

/// Where a document comes from
pub enum InputSource {
    File(PathBuf),
    Bytes(Vec<u8>),
    Text(String),
    Reader(Box<dyn Read + Send>),
    /// Only the `file:` scheme is supported
    Uri(String),
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::File(path) => f.debug_tuple("File").field(path).finish(),
            InputSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            InputSource::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            InputSource::Reader(_) => f.write_str("Reader"),
            InputSource::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
        }
    }
}

impl InputSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        InputSource::File(path.as_ref().to_path_buf())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        InputSource::Bytes(bytes.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        InputSource::Text(text.into())
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        InputSource::Reader(Box::new(reader))
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        InputSource::Uri(uri.into())
    }

    /// Read and decode the source
    pub fn resolve(self) -> Result<ResolvedInput> {
        match self {
            InputSource::File(path) => {
                let system_id = file_system_id(&path);
                let bytes = fs::read(&path)?;
                let text = decode(&bytes, &system_id)?;
                Ok(ResolvedInput::new(Some(system_id), text))
            }
            InputSource::Bytes(bytes) => Ok(ResolvedInput::new(None, decode(&bytes, "<bytes>")?)),
            InputSource::Text(text) => {
                let text = match text.strip_prefix('\u{FEFF}') {
                    Some(stripped) => stripped.to_string(),
                    None => text,
                };
                Ok(ResolvedInput::new(None, text))
            }
            InputSource::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(ResolvedInput::new(None, decode(&bytes, "<stream>")?))
            }
            InputSource::Uri(uri) => {
                let url = Url::parse(&uri).map_err(|e| ReadError::UnsupportedUri(format!("{}: {}", uri, e)))?;
                if url.scheme() != "file" {
                    return Err(ReadError::UnsupportedUri(uri));
                }
                let path = url
                    .to_file_path()
                    .map_err(|_| ReadError::UnsupportedUri(uri.clone()))?;
                let bytes = fs::read(&path)?;
                let text = decode(&bytes, &uri)?;
                Ok(ResolvedInput::new(Some(uri), text))
            }
        }
    }
}

impl From<&str> for InputSource {
    fn from(text: &str) -> Self {
        InputSource::text(text)
    }
}

impl From<String> for InputSource {
    fn from(text: String) -> Self {
        InputSource::Text(text)
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

impl From<PathBuf> for InputSource {
    fn from(path: PathBuf) -> Self {
        InputSource::File(path)
    }
}

/// Decoded document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub system_id: Option<String>,
    pub text: String,
}

impl ResolvedInput {
    pub fn new(system_id: Option<String>, text: String) -> Self {
        Self { system_id, text }
    }
}

fn file_system_id(path: &Path) -> String {
    fs::canonicalize(path)
        .ok()
        .and_then(|absolute| Url::from_file_path(absolute).ok())
        .map_or_else(|| path.display().to_string(), |url| url.to_string())
}

/// Decode raw bytes. A byte order mark selects UTF-8 or UTF-16; without one
/// the bytes must be UTF-8, unless the XML declaration names ISO-8859-1.
fn decode(bytes: &[u8], system_id: &str) -> Result<String> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => utf8(rest, system_id),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, system_id, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, system_id, u16::from_be_bytes),
        _ if declares_latin1(bytes) => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        _ => utf8(bytes, system_id),
    }
}

fn utf8(bytes: &[u8], system_id: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ReadError::encoding(system_id, e.to_string()))
}

fn utf16(bytes: &[u8], system_id: &str, unit: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(ReadError::encoding(system_id, "odd number of bytes in UTF-16 input"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ReadError::encoding(system_id, e.to_string()))
}

fn declares_latin1(bytes: &[u8]) -> bool {
    if !bytes.starts_with(b"<?xml") {
        return false;
    }
    let end = bytes
        .windows(2)
        .position(|w| w == b"?>")
        .unwrap_or(bytes.len().min(200));
    let declaration = String::from_utf8_lossy(&bytes[..end]).to_ascii_lowercase();
    ["iso-8859-1", "latin1", "latin-1"]
        .iter()
        .any(|name| declaration.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_text_strips_bom() {
        let input = InputSource::text("\u{FEFF}<a/>").resolve().unwrap();
        assert_eq!(input.text, "<a/>");
        assert_eq!(input.system_id, None);
    }

    #[test]
    fn test_utf16_bytes() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a>é</a>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let input = InputSource::bytes(bytes).resolve().unwrap();
        assert_eq!(input.text, "<a>é</a>");

        let mut bytes = vec![0xFE, 0xFF];
        for unit in "<b/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(InputSource::bytes(bytes).resolve().unwrap().text, "<b/>");
    }

    #[test]
    fn test_latin1_declaration() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</a>");
        let input = InputSource::bytes(bytes).resolve().unwrap();
        assert!(input.text.ends_with("<a>é</a>"));
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let err = InputSource::bytes(vec![b'<', 0xC3, 0x28]).resolve().unwrap_err();
        assert!(matches!(err, ReadError::Encoding { .. }));
    }

    #[test]
    fn test_reader_source() {
        let input = InputSource::reader(Cursor::new(b"<r/>".to_vec()))
            .resolve()
            .unwrap();
        assert_eq!(input.text, "<r/>");
    }

    #[test]
    fn test_file_and_uri_sources() {
        let path = std::env::temp_dir().join(format!("microdom-input-{}.xml", std::process::id()));
        fs::write(&path, "<file/>").unwrap();

        let input = InputSource::file(&path).resolve().unwrap();
        assert_eq!(input.text, "<file/>");
        assert!(input.system_id.as_deref().unwrap().starts_with("file:"));

        let uri = Url::from_file_path(fs::canonicalize(&path).unwrap())
            .unwrap()
            .to_string();
        let input = InputSource::uri(uri.clone()).resolve().unwrap();
        assert_eq!(input.text, "<file/>");
        assert_eq!(input.system_id, Some(uri));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unsupported_uri() {
        let err = InputSource::uri("http://example.com/doc.xml")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedUri(_)));
        assert!(InputSource::uri("not a uri").resolve().is_err());
    }
}
