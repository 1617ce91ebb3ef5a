//! Streaming core for migtail
//!
//! This crate provides incremental line framing over chunked byte streams,
//! a session-wide dedup set coupled to a bounded line buffer, multi-source
//! fan-in, the session state machine, and the pure filter/export layer.

mod buffer;
mod export;
mod filter;
mod framing;
mod fuzzy;
mod session;
mod transport;

pub use buffer::{DEFAULT_CAPACITY, DedupBuffer};
pub use export::{DebugLogSource, DirEntry, ExportError, bundle, collect_debug_logs, render_lines};
pub use filter::apply_filter;
pub use fuzzy::fuzzy_match;
pub use session::{Session, SessionConfig, SourceLocator};
pub use transport::{ChunkStream, LocatorError, LogTransport, TransportError};

// Re-export types used in our public API
pub use migtail_types::{
    FetchOptions, FilterCriteria, LineMeta, LogLevel, LogLine, LogTarget, ReconnectPolicy,
    SessionState, Source,
};
