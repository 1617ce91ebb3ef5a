//! Display-side line metadata.
//!
//! Pure parsing over `LogLine::text` for presentation: timestamp prefix and
//! severity extraction. Kept out of the streaming core on purpose; the
//! buffer stores lines verbatim.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::LogLevel;

/// ISO-8601-like timestamp prefix, as emitted by `kubectl logs --timestamps`
/// and most structured loggers.
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?\s*")
        .expect("timestamp prefix pattern")
});

/// Strip a leading ISO-8601-like timestamp, returning the rest of the line.
pub fn strip_timestamp_prefix(text: &str) -> &str {
    match TIMESTAMP_PREFIX.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Parsed display metadata for one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMeta<'a> {
    /// Timestamp prefix, if the line carried one
    pub timestamp: Option<DateTime<Utc>>,

    /// Detected severity
    pub level: LogLevel,

    /// Line content with the timestamp prefix removed
    pub message: &'a str,
}

impl<'a> LineMeta<'a> {
    pub fn parse(text: &'a str) -> Self {
        let (timestamp, message) = match TIMESTAMP_PREFIX.find(text) {
            Some(m) => (
                DateTime::parse_from_rfc3339(text[..m.end()].trim_end())
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc)),
                &text[m.end()..],
            ),
            None => (None, text),
        };

        Self {
            timestamp,
            level: detect_level(message),
            message,
        }
    }
}

/// Detect a severity from plain-text conventions: `[ERROR]`, `ERROR:`,
/// ` ERROR `, or a leading level word.
fn detect_level(content: &str) -> LogLevel {
    let upper = content.to_uppercase();

    let bracket_patterns = [
        ("[FATAL]", LogLevel::Fatal),
        ("[PANIC]", LogLevel::Fatal),
        ("[CRITICAL]", LogLevel::Fatal),
        ("[ERROR]", LogLevel::Error),
        ("[ERR]", LogLevel::Error),
        ("[WARN]", LogLevel::Warn),
        ("[WARNING]", LogLevel::Warn),
        ("[INFO]", LogLevel::Info),
        ("[DEBUG]", LogLevel::Debug),
        ("[TRACE]", LogLevel::Trace),
    ];
    for (pattern, level) in bracket_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    let colon_patterns = [
        ("FATAL:", LogLevel::Fatal),
        ("PANIC:", LogLevel::Fatal),
        ("ERROR:", LogLevel::Error),
        ("ERR:", LogLevel::Error),
        ("WARNING:", LogLevel::Warn),
        ("WARN:", LogLevel::Warn),
        ("INFO:", LogLevel::Info),
        ("DEBUG:", LogLevel::Debug),
        ("TRACE:", LogLevel::Trace),
    ];
    for (pattern, level) in colon_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    let spaced_patterns = [
        (" FATAL ", LogLevel::Fatal),
        (" PANIC ", LogLevel::Fatal),
        (" ERROR ", LogLevel::Error),
        (" WARN ", LogLevel::Warn),
        (" WARNING ", LogLevel::Warn),
        (" INFO ", LogLevel::Info),
        (" DEBUG ", LogLevel::Debug),
        (" TRACE ", LogLevel::Trace),
    ];
    for (pattern, level) in spaced_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    let start_patterns = [
        ("FATAL", LogLevel::Fatal),
        ("PANIC", LogLevel::Fatal),
        ("ERROR", LogLevel::Error),
        ("ERR", LogLevel::Error),
        ("WARN", LogLevel::Warn),
        ("INFO", LogLevel::Info),
        ("DEBUG", LogLevel::Debug),
        ("TRACE", LogLevel::Trace),
    ];
    let trimmed_upper = upper.trim_start();
    for (pattern, level) in start_patterns {
        if trimmed_upper.starts_with(pattern) {
            return level;
        }
    }

    LogLevel::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_prefix() {
        let meta = LineMeta::parse("2024-01-15T10:30:00.123456789Z migration plan ready");
        assert!(meta.timestamp.is_some());
        assert_eq!(meta.message, "migration plan ready");
    }

    #[test]
    fn strips_prefix_without_timezone() {
        assert_eq!(
            strip_timestamp_prefix("2024-01-15 10:30:00 ERROR disk stalled"),
            "ERROR disk stalled"
        );
    }

    #[test]
    fn detects_bracketed_level() {
        let meta = LineMeta::parse("[ERROR] precopy failed");
        assert_eq!(meta.level, LogLevel::Error);
    }

    #[test]
    fn detects_leading_level_after_timestamp() {
        let meta = LineMeta::parse("2024-01-15T10:30:00Z WARN cutover deferred");
        assert_eq!(meta.level, LogLevel::Warn);
        assert_eq!(meta.message, "WARN cutover deferred");
    }

    #[test]
    fn multibyte_content_does_not_panic() {
        let meta = LineMeta::parse("─────────────────────────");
        assert!(meta.timestamp.is_none());
        assert_eq!(meta.level, LogLevel::Unknown);
    }

    #[test]
    fn no_level_is_unknown() {
        let meta = LineMeta::parse("copied 4096 blocks");
        assert_eq!(meta.level, LogLevel::Unknown);
    }
}
