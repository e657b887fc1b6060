//! Reader configuration
//!
//! `EngineConfig` holds the parser toggles and is what a pooled engine is
//! built with. `ReaderSettings` is the per-request surface: toggles plus
//! open-ended properties and features, an optional schema and handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ReadError, Result};
use crate::handlers::{EntityResolver, ErrorHandler, ExceptionHandler};

/// Property: maximum number of nodes in a parsed document (u32)
pub const PROPERTY_NODES_LIMIT: &str = "nodes-limit";

/// Feature: accept documents with a DOCTYPE declaration
pub const FEATURE_ALLOW_DTD: &str = "allow-dtd";

/// Parser toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub namespace_aware: bool,
    pub validating: bool,
    pub coalescing: bool,
    pub expand_entity_references: bool,
    pub ignore_comments: bool,
    pub ignore_element_content_whitespace: bool,
    pub xinclude_aware: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace_aware: true,
            validating: false,
            coalescing: false,
            expand_entity_references: true,
            ignore_comments: false,
            ignore_element_content_whitespace: false,
            xinclude_aware: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Values taken from the property and feature maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub nodes_limit: u32,
    pub allow_dtd: bool,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            nodes_limit: u32::MAX,
            allow_dtd: true,
        }
    }
}

/// Per-request reader settings
#[derive(Clone, Default)]
pub struct ReaderSettings {
    pub config: EngineConfig,
    pub properties: BTreeMap<String, Value>,
    pub features: BTreeMap<String, bool>,
    /// Schema location; validation against it is not supported
    pub schema: Option<String>,
    /// Always parse with a fresh, unpooled engine
    pub require_new_parser: bool,
    pub entity_resolver: Option<Arc<dyn EntityResolver>>,
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
    pub exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl fmt::Debug for ReaderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSettings")
            .field("config", &self.config)
            .field("properties", &self.properties)
            .field("features", &self.features)
            .field("schema", &self.schema)
            .field("require_new_parser", &self.require_new_parser)
            .field("entity_resolver", &self.entity_resolver.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

impl ReaderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_namespace_aware(mut self, on: bool) -> Self {
        self.config.namespace_aware = on;
        self
    }

    pub fn with_validating(mut self, on: bool) -> Self {
        self.config.validating = on;
        self
    }

    pub fn with_coalescing(mut self, on: bool) -> Self {
        self.config.coalescing = on;
        self
    }

    pub fn with_expand_entity_references(mut self, on: bool) -> Self {
        self.config.expand_entity_references = on;
        self
    }

    pub fn with_ignore_comments(mut self, on: bool) -> Self {
        self.config.ignore_comments = on;
        self
    }

    pub fn with_ignore_element_content_whitespace(mut self, on: bool) -> Self {
        self.config.ignore_element_content_whitespace = on;
        self
    }

    pub fn with_xinclude_aware(mut self, on: bool) -> Self {
        self.config.xinclude_aware = on;
        self
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_feature(mut self, key: &str, on: bool) -> Self {
        self.features.insert(key.to_string(), on);
        self
    }

    pub fn with_schema(mut self, location: &str) -> Self {
        self.schema = Some(location.to_string());
        self
    }

    pub fn with_require_new_parser(mut self, on: bool) -> Self {
        self.require_new_parser = on;
        self
    }

    pub fn with_entity_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.entity_resolver = Some(resolver);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// Whether an engine built with `pool_config` can serve this request
    pub fn is_poolable(&self, pool_config: &EngineConfig) -> bool {
        self.schema.is_none()
            && self.properties.is_empty()
            && self.features.is_empty()
            && !self.require_new_parser
            && self.config == *pool_config
    }

    /// Resolve the property and feature maps. Unknown keys and values of the
    /// wrong type are rejected.
    pub fn limits(&self) -> Result<EngineLimits> {
        let mut limits = EngineLimits::default();

        for (key, value) in &self.properties {
            match key.as_str() {
                PROPERTY_NODES_LIMIT => {
                    limits.nodes_limit = value
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            ReadError::invalid_property(key, format!("expected u32, got {}", value))
                        })?;
                }
                _ => return Err(ReadError::invalid_property(key, "unknown property")),
            }
        }

        for (key, on) in &self.features {
            match key.as_str() {
                FEATURE_ALLOW_DTD => limits.allow_dtd = *on,
                _ => return Err(ReadError::invalid_property(key, "unknown feature")),
            }
        }

        Ok(limits)
    }
}
