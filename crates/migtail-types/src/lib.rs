//! Shared types for migtail
//!
//! This crate contains the data model used across the migtail crates:
//! log lines, sources and targets, session state, and filter criteria.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

mod meta;

pub use meta::{LineMeta, strip_timestamp_prefix};

// ============================================================================
// Sources and Targets
// ============================================================================

/// One concrete stream origin, e.g. a single pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    /// Stable identifier, shown as the line prefix (the pod name)
    pub id: String,

    /// Namespace the pod lives in
    pub namespace: String,

    /// Container to read from, if the pod has more than one
    pub container: Option<String>,
}

impl Source {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            container: None,
        }
    }
}

/// The logical target of a viewing session: one named pod, or every pod
/// matching a label selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    Pod {
        namespace: String,
        name: String,
    },
    Selector {
        namespace: String,
        labels: BTreeMap<String, String>,
    },
}

impl LogTarget {
    /// An empty target never connects; a session enabled against one stays idle.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Pod { name, .. } => name.is_empty(),
            Self::Selector { labels, .. } => labels.is_empty(),
        }
    }

    /// Whether this target fans out over a discovered set of sources.
    pub fn is_aggregated(&self) -> bool {
        matches!(self, Self::Selector { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Pod { namespace, name } => format!("{}/{}", namespace, name),
            Self::Selector { namespace, labels } => {
                let selector = labels
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}/[{}]", namespace, selector)
            }
        }
    }
}

// ============================================================================
// Log Lines
// ============================================================================

/// A single framed log line, immutable once appended.
///
/// `sequence` is buffer-local and assigned at append time; it is not derived
/// from source timestamps, which may be absent or skewed.
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub source_id: String,
    pub sequence: u64,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    /// Parse a log level from common spellings
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Self::Trace,
            "debug" | "dbg" | "debg" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "erro" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "???",
        }
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Filter criteria for a derived view over the buffer.
///
/// Pure input to the filter engine; holds no state across calls. A query
/// wrapped in double quotes requests exact (substring) matching, anything
/// else is matched fuzzily.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Level to keep, or `None` for all levels
    pub level: Option<LogLevel>,

    /// Text query with surrounding quotes removed
    pub query: String,

    /// Exact substring match instead of fuzzy
    pub exact: bool,
}

impl FilterCriteria {
    /// Build criteria from a raw query string, unwrapping a double-quoted
    /// query into an exact match.
    pub fn new(level: Option<LogLevel>, raw_query: &str) -> Self {
        let trimmed = raw_query.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            Self {
                level,
                query: trimmed[1..trimmed.len() - 1].to_string(),
                exact: true,
            }
        } else {
            Self {
                level,
                query: trimmed.to_string(),
                exact: false,
            }
        }
    }

    /// Criteria that keep every line
    pub fn pass_all() -> Self {
        Self::default()
    }

    pub fn is_pass_all(&self) -> bool {
        self.level.is_none() && self.query.is_empty()
    }
}

// ============================================================================
// Session Control
// ============================================================================

/// State of one viewing session. `Idle` is initial; there is no terminal
/// state, a session ends when its owner drops it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Paused,
    Error,
    Reconnecting,
}

/// What a session does after an unrecoverable read failure.
///
/// Single-pod sessions wait for an explicit `reconnect()`; aggregated
/// sessions retry on a fixed interval for as long as they stay enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Manual,
    Backoff(Duration),
}

impl ReconnectPolicy {
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

    pub fn default_for(target: &LogTarget) -> Self {
        if target.is_aggregated() {
            Self::Backoff(Self::DEFAULT_BACKOFF)
        } else {
            Self::Manual
        }
    }
}

/// Options for one stream fetch.
///
/// `tail_lines` is only sent on the first connect of a session (history
/// replay); `limit_bytes` caps a single connection's payload as a safety
/// valve, not a pagination mechanism.
#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    pub follow: bool,
    pub tail_lines: Option<i64>,
    pub limit_bytes: Option<i64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            follow: true,
            tail_lines: Some(100),
            limit_bytes: Some(8 * 1024 * 1024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_query_becomes_exact() {
        let criteria = FilterCriteria::new(None, "\"connection refused\"");
        assert!(criteria.exact);
        assert_eq!(criteria.query, "connection refused");
    }

    #[test]
    fn unquoted_query_stays_fuzzy() {
        let criteria = FilterCriteria::new(Some(LogLevel::Warn), "conref");
        assert!(!criteria.exact);
        assert_eq!(criteria.query, "conref");
    }

    #[test]
    fn lone_quote_is_not_exact() {
        let criteria = FilterCriteria::new(None, "\"");
        assert!(!criteria.exact);
    }

    #[test]
    fn empty_targets() {
        let pod = LogTarget::Pod {
            namespace: "mig".into(),
            name: String::new(),
        };
        assert!(pod.is_empty());

        let selector = LogTarget::Selector {
            namespace: "mig".into(),
            labels: BTreeMap::new(),
        };
        assert!(selector.is_empty());
        assert!(selector.is_aggregated());
    }

    #[test]
    fn level_parsing() {
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("ERR"), LogLevel::Error);
        assert_eq!(LogLevel::parse("panic"), LogLevel::Fatal);
        assert_eq!(LogLevel::parse("???"), LogLevel::Unknown);
    }
}
