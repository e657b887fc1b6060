//! DOM reader entry point

use microdom::DomArena;
use std::sync::Arc;

use crate::builder::TreeBuilder;
use crate::engine::{ParserEngine, RoxmlEngine};
use crate::error::{ReadError, Result};
use crate::handlers::{
    CollectingErrorHandler, ErrorHandler, ExceptionHandler, LoggingErrorHandler,
    LoggingExceptionHandler, ParseMessage,
};
use crate::input::{InputSource, ResolvedInput};
use crate::pool::{ReaderPool, DEFAULT_POOL_CAPACITY};
use crate::settings::{EngineConfig, ReaderSettings};

/// Forwards each diagnostic to the caller's handler and keeps a copy
struct ForwardingHandler {
    collected: CollectingErrorHandler,
    delegate: Arc<dyn ErrorHandler>,
}

impl ErrorHandler for ForwardingHandler {
    fn handle(&self, message: &ParseMessage) {
        self.collected.handle(message);
        self.delegate.handle(message);
    }
}

/// Parses documents into `DomArena`s, borrowing engines from a shared pool
#[derive(Debug, Clone)]
pub struct DomReader {
    pool: Arc<ReaderPool<RoxmlEngine>>,
    pool_config: EngineConfig,
}

impl Default for DomReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DomReader {
    pub fn new() -> Self {
        Self::with_pool(DEFAULT_POOL_CAPACITY, EngineConfig::default())
    }

    /// Reader whose pooled engines are built with `config`
    pub fn with_pool(capacity: usize, config: EngineConfig) -> Self {
        let pool = ReaderPool::with_capacity(capacity, move || RoxmlEngine::new(config));
        Self {
            pool: Arc::new(pool),
            pool_config: config,
        }
    }

    pub fn pool(&self) -> &Arc<ReaderPool<RoxmlEngine>> {
        &self.pool
    }

    /// Parse with default settings
    pub fn read_source(&self, source: InputSource) -> Result<DomArena> {
        self.read(source, &ReaderSettings::default())
    }

    /// Parse `source` into a tree rooted at a Document node.
    ///
    /// Every diagnostic reaches the settings' error handler. If any of them
    /// is fatal no tree is returned. I/O and decoding failures go to the
    /// exception handler before being returned.
    pub fn read(&self, source: InputSource, settings: &ReaderSettings) -> Result<DomArena> {
        let result = source.resolve().and_then(|input| self.parse(&input, settings));
        if let Err(err) = &result {
            if !matches!(err, ReadError::Fatal { .. }) {
                match &settings.exception_handler {
                    Some(handler) => handler.handle_exception(err),
                    None => LoggingExceptionHandler.handle_exception(err),
                }
            }
        }
        result
    }

    fn parse(&self, input: &ResolvedInput, settings: &ReaderSettings) -> Result<DomArena> {
        let handler = Arc::new(ForwardingHandler {
            collected: CollectingErrorHandler::new(),
            delegate: settings
                .error_handler
                .clone()
                .unwrap_or_else(|| Arc::new(LoggingErrorHandler)),
        });

        let mut builder = TreeBuilder::new();
        if settings.is_poolable(&self.pool_config) {
            let mut engine = self.pool.borrow();
            engine.bind(settings.entity_resolver.clone(), Some(handler.clone()));
            engine.parse(input, &mut builder)?;
        } else {
            tracing::debug!("Parsing with an unpooled engine");
            let mut engine = RoxmlEngine::with_limits(settings.config, settings.limits()?);
            engine.bind(settings.entity_resolver.clone(), Some(handler.clone()));
            engine.parse(input, &mut builder)?;
        }

        if handler.collected.has_fatal() {
            return Err(ReadError::Fatal {
                messages: handler.collected.messages(),
            });
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Severity;
    use crate::settings::{FEATURE_ALLOW_DTD, PROPERTY_NODES_LIMIT};
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_read_returns_document_root() {
        let reader = DomReader::new();
        let arena = reader
            .read_source(InputSource::text("<greeting>hi</greeting>"))
            .unwrap();
        let doc = arena.root_id().unwrap();
        assert_eq!(arena.node_type(doc).unwrap(), microdom::NodeType::Document);
        let greeting = arena.first_child_element(doc).unwrap().unwrap();
        assert_eq!(arena.text_content(greeting).unwrap(), "hi");
    }

    #[test]
    fn test_fatal_error_yields_no_tree() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let settings = ReaderSettings::new().with_error_handler(Arc::new(move |m: &ParseMessage| {
            sink.lock().unwrap().push(m.severity);
        }));

        let err = DomReader::new()
            .read(InputSource::text("<a><b></a>"), &settings)
            .unwrap_err();
        match err {
            ReadError::Fatal { messages } => assert!(messages[0].is_fatal()),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(*seen.lock().unwrap(), vec![Severity::Fatal]);
    }

    #[test]
    fn test_pooled_engine_returned_after_read() {
        let reader = DomReader::with_pool(2, EngineConfig::default());
        reader.read_source(InputSource::text("<a/>")).unwrap();
        let _ = reader.read_source(InputSource::text("<broken"));

        let stats = reader.pool().stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn test_incompatible_settings_bypass_pool() {
        let reader = DomReader::new();
        let settings = ReaderSettings::new()
            .with_ignore_comments(true)
            .with_property(PROPERTY_NODES_LIMIT, json!(100))
            .with_feature(FEATURE_ALLOW_DTD, true);

        let arena = reader
            .read(InputSource::text("<r><!-- gone --><a/></r>"), &settings)
            .unwrap();
        let r = arena.first_child_element(arena.root_id().unwrap()).unwrap().unwrap();
        assert_eq!(arena.child_count(r).unwrap(), 1);
        assert_eq!(reader.pool().stats().live, 0);
    }

    #[test]
    fn test_nodes_limit_is_enforced() {
        let settings = ReaderSettings::new().with_property(PROPERTY_NODES_LIMIT, json!(3));
        let err = DomReader::new()
            .read(InputSource::text("<a><b/><c/><d/><e/></a>"), &settings)
            .unwrap_err();
        assert!(matches!(err, ReadError::Fatal { .. }));
    }

    #[test]
    fn test_exception_handler_sees_io_errors() {
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let settings = ReaderSettings::new().with_exception_handler(Arc::new(move |_: &ReadError| {
            *sink.lock().unwrap() += 1;
        }));

        let err = DomReader::new()
            .read(InputSource::file("/nonexistent/microdom/input.xml"), &settings)
            .unwrap_err();
        assert!(matches!(err, ReadError::Io(_)));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_io_error_without_exception_handler_is_logged() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let err = DomReader::new()
            .read_source(InputSource::file("/nonexistent/microdom/input.xml"))
            .unwrap_err();
        assert!(matches!(err, ReadError::Io(_)));
    }

    #[test]
    fn test_invalid_property_is_rejected() {
        let settings = ReaderSettings::new().with_property("no-such-property", json!(true));
        let err = DomReader::new()
            .read(InputSource::text("<a/>"), &settings)
            .unwrap_err();
        assert!(matches!(err, ReadError::InvalidProperty { .. }));
    }
}
