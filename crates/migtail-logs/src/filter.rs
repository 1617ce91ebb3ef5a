//! Derived views over the buffer.
//!
//! Pure and stateless given `(lines, criteria)`: the level filter runs
//! first, the text filter over its result. The buffer is never mutated and
//! repeated calls with the same inputs return the same view.

use std::sync::LazyLock;

use regex::Regex;

use migtail_types::{FilterCriteria, LogLevel, LogLine, strip_timestamp_prefix};

use crate::fuzzy::fuzzy_match;

/// Structured `level=<LEVEL>` token, with optional quoting as emitted by
/// logfmt-style and JSON loggers.
static LEVEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\blevel["']?\s*[=:]\s*["']?([a-z]+)"#).expect("level token pattern")
});

/// Apply filter criteria to a snapshot of lines.
pub fn apply_filter(lines: &[LogLine], criteria: &FilterCriteria) -> Vec<LogLine> {
    if criteria.is_pass_all() {
        return lines.to_vec();
    }

    lines
        .iter()
        .filter(|line| matches_level(&line.text, criteria.level))
        .filter(|line| matches_query(&line.text, criteria))
        .cloned()
        .collect()
}

/// A line passes the level filter if it carries a structured
/// `level=<LEVEL>` token for the wanted level, or its first token after
/// the timestamp prefix starts with the level name, case-insensitively.
fn matches_level(text: &str, wanted: Option<LogLevel>) -> bool {
    let Some(wanted) = wanted else {
        return true;
    };

    let content = strip_timestamp_prefix(text);

    if let Some(captures) = LEVEL_TOKEN.captures(content) {
        if LogLevel::parse(&captures[1]) == wanted {
            return true;
        }
    }

    let Some(first) = content.split_whitespace().next() else {
        return false;
    };
    let token = first.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    match token.get(..wanted.as_str().len()) {
        Some(prefix) => prefix.eq_ignore_ascii_case(wanted.as_str()),
        None => false,
    }
}

fn matches_query(text: &str, criteria: &FilterCriteria) -> bool {
    if criteria.query.is_empty() {
        return true;
    }
    if criteria.exact {
        text.to_lowercase().contains(&criteria.query.to_lowercase())
    } else {
        fuzzy_match(&criteria.query, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<LogLine> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| LogLine {
                source_id: "pod".into(),
                sequence: i as u64,
                text: (*text).to_string(),
                received_at: chrono::Utc::now(),
            })
            .collect()
    }

    fn texts(view: &[LogLine]) -> Vec<&str> {
        view.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn level_filter_matches_structured_token() {
        let input = lines(&[
            r#"level=error copy failed"#,
            r#"{"level":"info","msg":"ok"}"#,
            "no level here",
        ]);
        let criteria = FilterCriteria::new(Some(LogLevel::Error), "");
        assert_eq!(texts(&apply_filter(&input, &criteria)), ["level=error copy failed"]);
    }

    #[test]
    fn level_filter_matches_leading_token_after_timestamp() {
        let input = lines(&[
            "2024-01-15T10:30:00Z ERROR: disk stalled",
            "2024-01-15T10:30:01Z INFO all good",
            "[error] bracketed",
        ]);
        let criteria = FilterCriteria::new(Some(LogLevel::Error), "");
        assert_eq!(
            texts(&apply_filter(&input, &criteria)),
            ["2024-01-15T10:30:00Z ERROR: disk stalled", "[error] bracketed"]
        );
    }

    #[test]
    fn quoted_query_is_exact_case_insensitive_substring() {
        let input = lines(&["Connection Refused by host", "connection dropped"]);
        let criteria = FilterCriteria::new(None, "\"connection refused\"");
        assert_eq!(
            texts(&apply_filter(&input, &criteria)),
            ["Connection Refused by host"]
        );
    }

    #[test]
    fn unquoted_query_is_fuzzy() {
        let input = lines(&["precopy of disk 2 started", "cutover done"]);
        let criteria = FilterCriteria::new(None, "pcpy dsk");
        assert_eq!(
            texts(&apply_filter(&input, &criteria)),
            ["precopy of disk 2 started"]
        );
    }

    #[test]
    fn filters_compose_level_first() {
        let input = lines(&[
            "ERROR migration stalled",
            "ERROR unrelated",
            "INFO migration stalled",
        ]);
        let criteria = FilterCriteria::new(Some(LogLevel::Error), "\"stalled\"");
        assert_eq!(texts(&apply_filter(&input, &criteria)), ["ERROR migration stalled"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let input = lines(&["ERROR a", "INFO b", "warn c", "ERROR d"]);
        let criteria = FilterCriteria::new(Some(LogLevel::Error), "");
        let once = apply_filter(&input, &criteria);
        let twice = apply_filter(&once, &criteria);
        assert_eq!(texts(&once), texts(&twice));
    }

    #[test]
    fn pass_all_clones_everything_in_order() {
        let input = lines(&["b", "a", "c"]);
        let view = apply_filter(&input, &FilterCriteria::pass_all());
        assert_eq!(texts(&view), ["b", "a", "c"]);
    }
}
