//! Namespace Stack
//!
//! Scoped namespace bookkeeping for one serialization pass: one level per
//! open element, resolution always from the innermost level outwards.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `xml` prefix namespace, bound implicitly everywhere
pub const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of the `xmlns` declaration attributes
pub const XMLNS_NS_URI: &str = "http://www.w3.org/2000/xmlns/";

const SYNTHESIZED_PREFIX: &str = "ns";

/// Fixed, externally supplied URI → prefix mapping
///
/// An empty prefix makes the URI the default namespace where it is first used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceContext {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, prefix: &str, uri: &str) -> Self {
        self.add_mapping(prefix, uri);
        self
    }

    pub fn add_mapping(&mut self, prefix: &str, uri: &str) {
        self.prefixes.insert(uri.to_string(), prefix.to_string());
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.prefixes.get(uri).map(String::as_str)
    }
}

/// Namespace scope of a single element
#[derive(Debug, Clone, Default)]
pub struct NamespaceLevel {
    default_namespace_uri: Option<String>,
    /// URI → prefix
    prefixes: AHashMap<String, String>,
}

impl NamespaceLevel {
    pub fn default_namespace_uri(&self) -> Option<&str> {
        self.default_namespace_uri.as_deref()
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.prefixes.get(uri).map(String::as_str)
    }

    pub fn uri_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(_, p)| p.as_str() == prefix)
            .map(|(uri, _)| uri.as_str())
    }
}

/// A prefix bound again, to another URI, while still in scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConflict {
    pub prefix: String,
    pub previous_uri: String,
    pub uri: String,
}

/// Outcome of resolving a namespace URI to a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrefix {
    /// `None` means the default namespace (no prefix)
    pub prefix: Option<String>,
    /// Whether the binding is new and must be declared on the current element
    pub declare: bool,
}

impl ResolvedPrefix {
    fn existing(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(String::from),
            declare: false,
        }
    }

    fn declared(prefix: Option<String>) -> Self {
        Self {
            prefix,
            declare: true,
        }
    }
}

/// Stack of namespace levels for one serialization pass
#[derive(Debug)]
pub struct NamespaceStack<'c> {
    levels: Vec<NamespaceLevel>,
    context: Option<&'c NamespaceContext>,
    /// Prefixes synthesized so far in this pass, URI → prefix
    synthesized: AHashMap<String, String>,
}

impl<'c> NamespaceStack<'c> {
    pub fn new(context: Option<&'c NamespaceContext>) -> Self {
        Self {
            levels: Vec::with_capacity(16),
            context,
            synthesized: AHashMap::new(),
        }
    }

    /// Enter a new element scope
    pub fn push(&mut self) {
        self.levels.push(NamespaceLevel::default());
    }

    /// Leave an element scope, dropping its bindings
    pub fn pop(&mut self) {
        self.levels.pop();
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    fn current(&mut self) -> &mut NamespaceLevel {
        if self.levels.is_empty() {
            self.push();
        }
        let last = self.levels.len() - 1;
        &mut self.levels[last]
    }

    /// Declare the default namespace of the current level. An empty URI undoes
    /// any inherited default for this scope.
    pub fn add_default_namespace_uri(&mut self, uri: &str) {
        self.current().default_namespace_uri = Some(uri.to_string());
    }

    /// Bind `prefix` to `uri` in the current level. Re-binding a prefix that
    /// is in scope with another URI is reported and logged; the new binding
    /// wins either way.
    pub fn add_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Option<NamespaceConflict> {
        let conflict = match self.uri_for_prefix(prefix) {
            Some(previous) if previous != uri => Some(NamespaceConflict {
                prefix: prefix.to_string(),
                previous_uri: previous.to_string(),
                uri: uri.to_string(),
            }),
            _ => None,
        };
        if let Some(c) = &conflict {
            tracing::warn!(
                "Namespace prefix '{}' re-bound from '{}' to '{}'",
                c.prefix,
                c.previous_uri,
                c.uri
            );
        }

        let level = self.current();
        level.prefixes.retain(|_, p| p.as_str() != prefix);
        level.prefixes.insert(uri.to_string(), prefix.to_string());
        conflict
    }

    /// Default namespace in scope: the nearest declared one, unless that is
    /// the empty URI
    pub fn default_namespace_uri(&self) -> Option<&str> {
        self.levels
            .iter()
            .rev()
            .find_map(NamespaceLevel::default_namespace_uri)
            .filter(|uri| !uri.is_empty())
    }

    /// URI currently bound to `prefix`
    pub fn uri_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.levels
            .iter()
            .rev()
            .find_map(|level| level.uri_for_prefix(prefix))
    }

    /// Innermost prefix mapped to `uri` that is not shadowed by an inner
    /// re-binding of the same prefix
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.levels
            .iter()
            .rev()
            .filter_map(|level| level.prefix_for(uri))
            .find(|prefix| self.uri_for_prefix(prefix) == Some(uri))
    }

    pub fn is_prefix_in_use(&self, prefix: &str) -> bool {
        self.levels
            .iter()
            .any(|level| level.uri_for_prefix(prefix).is_some())
    }

    /// Prefix for an element in `uri`: the default namespace, an existing
    /// mapping, the fixed context, or a synthesized `nsN`, in that order
    pub fn resolve_element(&mut self, uri: &str) -> ResolvedPrefix {
        if uri.is_empty() {
            return self.resolve_no_namespace();
        }
        if self.default_namespace_uri() == Some(uri) {
            return ResolvedPrefix::existing(None);
        }
        if let Some(prefix) = self.prefix_for(uri) {
            return ResolvedPrefix::existing(Some(prefix));
        }
        if let Some(prefix) = self.context.and_then(|c| c.prefix_for(uri)) {
            if prefix.is_empty() {
                self.add_default_namespace_uri(uri);
                return ResolvedPrefix::declared(None);
            }
            let prefix = prefix.to_string();
            self.add_prefix_mapping(&prefix, uri);
            return ResolvedPrefix::declared(Some(prefix));
        }
        ResolvedPrefix::declared(Some(self.synthesize(uri)))
    }

    /// Unprefixed name outside any namespace. Undeclares the default namespace
    /// when one is in scope.
    pub fn resolve_no_namespace(&mut self) -> ResolvedPrefix {
        if self.default_namespace_uri().is_none() {
            return ResolvedPrefix::existing(None);
        }
        self.add_default_namespace_uri("");
        ResolvedPrefix::declared(None)
    }

    /// Prefix for an attribute in `uri`. Attributes never use the default
    /// namespace; `xml` and `xmlns` are always bound.
    pub fn resolve_attribute(&mut self, uri: &str) -> ResolvedPrefix {
        if uri.is_empty() {
            return ResolvedPrefix::existing(None);
        }
        if uri == XML_NS_URI {
            return ResolvedPrefix::existing(Some("xml"));
        }
        if uri == XMLNS_NS_URI {
            return ResolvedPrefix::existing(Some("xmlns"));
        }
        if let Some(prefix) = self.prefix_for(uri) {
            return ResolvedPrefix::existing(Some(prefix));
        }
        if let Some(prefix) = self.context.and_then(|c| c.prefix_for(uri)) {
            if !prefix.is_empty() {
                let prefix = prefix.to_string();
                self.add_prefix_mapping(&prefix, uri);
                return ResolvedPrefix::declared(Some(prefix));
            }
        }
        ResolvedPrefix::declared(Some(self.synthesize(uri)))
    }

    /// Pick `nsN` for `uri` and bind it in the current level.
    ///
    /// A URI keeps the prefix it got earlier in the pass while that prefix is
    /// free; otherwise N is the smallest number neither bound on the stack nor
    /// handed to another URI in this pass.
    fn synthesize(&mut self, uri: &str) -> String {
        let reusable = self
            .synthesized
            .get(uri)
            .filter(|prefix| !self.is_prefix_in_use(prefix))
            .cloned();

        let prefix = match reusable {
            Some(prefix) => prefix,
            None => {
                let taken: Vec<&str> = self.synthesized.values().map(String::as_str).collect();
                let mut n = 0usize;
                loop {
                    let candidate = format!("{}{}", SYNTHESIZED_PREFIX, n);
                    if !self.is_prefix_in_use(&candidate) && !taken.contains(&candidate.as_str()) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };

        self.synthesized.insert(uri.to_string(), prefix.clone());
        self.add_prefix_mapping(&prefix, uri);
        prefix
    }
}
