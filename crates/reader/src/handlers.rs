//! Pluggable callbacks bound to a parser engine
//!
//! - `EntityResolver`: supplies the content of external DTD subsets
//! - `ErrorHandler`: receives every diagnostic produced while parsing
//! - `ExceptionHandler`: receives I/O and decoding failures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::error::ReadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// A parser diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseMessage {
    pub severity: Severity,
    pub message: String,
    pub system_id: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ParseMessage {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            system_id: None,
            line: None,
            column: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn in_system(mut self, system_id: Option<&str>) -> Self {
        self.system_id = system_id.map(str::to_string);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)?;
        if let Some(system_id) = &self.system_id {
            write!(f, " in {}", system_id)?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, " at {}:{}", line, column)?;
        }
        Ok(())
    }
}

/// Supplies replacement content for an external DTD subset
pub trait EntityResolver: Send + Sync {
    /// Declarations for the subset identified by `system_id`, or `None` to
    /// leave it unresolved
    fn resolve_entity(&self, public_id: Option<&str>, system_id: &str) -> Option<String>;
}

impl<F> EntityResolver for F
where
    F: Fn(Option<&str>, &str) -> Option<String> + Send + Sync,
{
    fn resolve_entity(&self, public_id: Option<&str>, system_id: &str) -> Option<String> {
        self(public_id, system_id)
    }
}

pub trait ErrorHandler: Send + Sync {
    fn handle(&self, message: &ParseMessage);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ParseMessage) + Send + Sync,
{
    fn handle(&self, message: &ParseMessage) {
        self(message)
    }
}

pub trait ExceptionHandler: Send + Sync {
    fn handle_exception(&self, error: &ReadError);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&ReadError) + Send + Sync,
{
    fn handle_exception(&self, error: &ReadError) {
        self(error)
    }
}

/// Default error handler: diagnostics go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, message: &ParseMessage) {
        match message.severity {
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error | Severity::Fatal => tracing::error!("{}", message),
        }
    }
}

/// Default exception handler
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_exception(&self, error: &ReadError) {
        tracing::error!("Read failed: {}", error);
    }
}

/// Keeps every diagnostic it sees
#[derive(Debug, Default)]
pub struct CollectingErrorHandler {
    messages: Mutex<Vec<ParseMessage>>,
}

impl CollectingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ParseMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn has_fatal(&self) -> bool {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(ParseMessage::is_fatal)
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn handle(&self, message: &ParseMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
    }
}
