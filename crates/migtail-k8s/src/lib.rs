//! Kubernetes integration for migtail
//!
//! This crate resolves log targets against a cluster and opens the chunked
//! log streams the session core consumes: the [`SourceLocator`] and
//! [`LogTransport`] implementations backed by `kube`.

mod client;
mod locate;
mod transport;

pub use client::KubeClient;
pub use locate::KubeSourceLocator;
pub use transport::KubeLogTransport;

// Re-export types that are used in our public API
pub use migtail_logs::{LogTransport, SourceLocator};
pub use migtail_types::{LogTarget, Source};
