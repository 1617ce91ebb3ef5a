//! Read-only export of the filtered view.
//!
//! Serializes lines for copy/download and can merge in supplementary
//! offline logs fetched through the debug directory-listing convention.
//! Everything on the debug path is best-effort: failures are logged and
//! skipped, never allowed to block the primary export.

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use migtail_types::LogLine;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("bad directory listing: {0}")]
    Listing(#[from] serde_json::Error),
}

/// One entry of a debug directory listing, a JSON array of
/// `{"name": ..., "type": ...}` objects.
#[derive(Clone, Debug, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir" || self.kind == "directory"
    }
}

/// Out-of-band static log fetch. A listing path yields a JSON array of
/// [`DirEntry`]; a file path yields its content.
pub trait DebugLogSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<String, ExportError>;
}

/// Serialize a filtered view, one `source | text` line each.
pub fn render_lines(lines: &[LogLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.source_id);
        out.push_str(" | ");
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

/// Fetch the static logs under `root`, recursing one directory level deep.
///
/// Each readable file is appended under a `==== <path> ====` header.
/// Unreadable files and unparsable listings degrade to an empty or partial
/// result.
pub fn collect_debug_logs(source: &dyn DebugLogSource, root: &str) -> String {
    let mut out = String::new();
    let entries = match list(source, root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root, error = %e, "debug log listing failed, skipping");
            return out;
        }
    };

    for entry in entries {
        let path = join(root, &entry.name);
        if entry.is_dir() {
            match list(source, &path) {
                Ok(children) => {
                    for child in children.iter().filter(|c| !c.is_dir()) {
                        append_file(source, &join(&path, &child.name), &mut out);
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "debug log listing failed, skipping"),
            }
        } else {
            append_file(source, &path, &mut out);
        }
    }

    out
}

/// Render the view and, when a debug source is available, append whatever
/// static logs it can produce.
pub fn bundle(lines: &[LogLine], debug: Option<(&dyn DebugLogSource, &str)>) -> String {
    let mut out = render_lines(lines);
    if let Some((source, root)) = debug {
        out.push_str(&collect_debug_logs(source, root));
    }
    out
}

fn list(source: &dyn DebugLogSource, path: &str) -> Result<Vec<DirEntry>, ExportError> {
    let body = source.fetch(path)?;
    Ok(serde_json::from_str(&body)?)
}

fn append_file(source: &dyn DebugLogSource, path: &str, out: &mut String) {
    match source.fetch(path) {
        Ok(content) => {
            out.push_str(&format!("==== {} ====\n", path));
            out.push_str(&content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }
        Err(e) => warn!(path = %path, error = %e, "debug log read failed, skipping"),
    }
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;

    struct MapSource(HashMap<String, String>);

    impl DebugLogSource for MapSource {
        fn fetch(&self, path: &str) -> Result<String, ExportError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| ExportError::Fetch(format!("not found: {}", path)))
        }
    }

    fn line(source_id: &str, text: &str) -> LogLine {
        LogLine {
            source_id: source_id.into(),
            sequence: 0,
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn renders_source_prefixed_lines() {
        let out = render_lines(&[line("pod-a", "hello"), line("pod-b", "world")]);
        assert_eq!(out, "pod-a | hello\npod-b | world\n");
    }

    #[test]
    fn collects_files_one_level_deep() {
        let mut map = HashMap::new();
        map.insert(
            "debug".to_string(),
            r#"[{"name":"top.log","type":"file"},{"name":"sub","type":"dir"}]"#.to_string(),
        );
        map.insert("debug/top.log".to_string(), "top line\n".to_string());
        map.insert(
            "debug/sub".to_string(),
            r#"[{"name":"inner.log","type":"file"},{"name":"deeper","type":"dir"}]"#.to_string(),
        );
        map.insert("debug/sub/inner.log".to_string(), "inner line".to_string());

        let out = collect_debug_logs(&MapSource(map), "debug");
        assert!(out.contains("==== debug/top.log ====\ntop line\n"));
        assert!(out.contains("==== debug/sub/inner.log ====\ninner line\n"));
        // The nested directory is not descended into.
        assert!(!out.contains("deeper"));
    }

    #[test]
    fn unreadable_files_degrade_silently() {
        let mut map = HashMap::new();
        map.insert(
            "debug".to_string(),
            r#"[{"name":"gone.log","type":"file"},{"name":"ok.log","type":"file"}]"#.to_string(),
        );
        map.insert("debug/ok.log".to_string(), "still here\n".to_string());

        let out = collect_debug_logs(&MapSource(map), "debug");
        assert!(out.contains("still here"));
        assert!(!out.contains("gone.log"));
    }

    #[test]
    fn listing_failure_never_blocks_primary_export() {
        let source = MapSource(HashMap::new());
        let out = bundle(&[line("pod-a", "hello")], Some((&source, "debug")));
        assert_eq!(out, "pod-a | hello\n");
    }
}
