//! Document reader for microdom
//!
//! Parses XML into a `microdom::DomArena` using pooled parser engines.
//!
//! ```text
//! InputSource → ResolvedInput → ParserEngine (pooled) → TreeBuilder → DomArena
//!                                     ↑
//!                     ReaderSettings (toggles, properties, handlers)
//! ```
//!
//! The pool is bounded: at most `capacity` engines exist, extra borrowers
//! wait. Requests whose settings the pooled engines cannot honor get a
//! private engine instead.

pub mod builder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod input;
pub mod pool;
pub mod reader;
pub mod settings;

pub use builder::{ContentHandler, StartElement, TreeBuilder};
pub use engine::{ParserEngine, RoxmlEngine};
pub use error::{ReadError, Result};
pub use handlers::{
    CollectingErrorHandler, EntityResolver, ErrorHandler, ExceptionHandler, ParseMessage, Severity,
};
pub use input::{InputSource, ResolvedInput};
pub use pool::{PoolStats, PooledEngine, ReaderPool, DEFAULT_POOL_CAPACITY};
pub use reader::DomReader;
pub use settings::{EngineConfig, ReaderSettings};
