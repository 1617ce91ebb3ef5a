//! Boundary contracts the streaming core consumes but does not implement.
//!
//! The transport hands over an already-authenticated chunked byte stream;
//! the locator resolves a logical target to concrete sources. Both are
//! traits so the session machinery can be driven by scripted in-memory
//! implementations in tests.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

use migtail_types::{FetchOptions, Source};

/// Raw byte chunks, newline-delimited text with no other framing guarantee.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Produced by the core's own abort calls; never user-visible and
    /// never triggers reconnect logic.
    #[error("stream cancelled")]
    Cancelled,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("read failed: {0}")]
    Read(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Opens one chunked log stream per call.
pub trait LogTransport: Send + Sync + 'static {
    fn open(
        &self,
        source: &Source,
        options: &FetchOptions,
    ) -> BoxFuture<'static, Result<ChunkStream, TransportError>>;
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("no sources matched {0}")]
    Empty(String),

    #[error("source discovery failed: {0}")]
    Discovery(String),
}
