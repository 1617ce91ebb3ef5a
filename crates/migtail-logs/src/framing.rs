//! Incremental line framing over chunked byte streams.
//!
//! The transport delivers raw byte chunks with no framing guarantee beyond
//! newline-delimited text; chunk boundaries can fall anywhere, including in
//! the middle of a multi-byte UTF-8 character. The framer keeps the
//! unterminated tail as bytes so a split character is reassembled before it
//! is ever decoded.

/// Accumulates chunks and yields complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    tail: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk and return every line completed by it.
    ///
    /// A line is the text up to but excluding `\n` (a trailing `\r` is also
    /// dropped). Lines that are empty after trimming are suppressed; they do
    /// not corrupt framing of what follows.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.tail[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            if let Some(line) = decode(&self.tail[consumed..end]) {
                lines.push(line);
            }
            consumed = end + 1;
        }
        self.tail.drain(..consumed);

        lines
    }

    /// Flush the retained tail at end-of-stream.
    ///
    /// Returns the final unterminated fragment, if it is non-empty after
    /// trimming.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.tail);
        decode(&tail)
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.tail.len()
    }
}

fn decode(bytes: &[u8]) -> Option<String> {
    let mut text = String::from_utf8_lossy(bytes);
    if text.ends_with('\r') {
        text.to_mut().pop();
    }
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_chunks(chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(framer.push(chunk));
        }
        lines.extend(framer.finish());
        lines
    }

    #[test]
    fn framing_is_invariant_under_chunk_boundaries() {
        // Every way of cutting the stream into up to three chunks yields
        // the same line sequence, including mid-line splits.
        let input = b"A\nB\nC";
        for i in 0..=input.len() {
            for j in i..=input.len() {
                let lines = frame_chunks(&[&input[..i], &input[i..j], &input[j..]]);
                assert_eq!(lines, ["A", "B", "C"], "split at ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn tail_is_flushed_at_end_of_stream() {
        assert_eq!(frame_chunks(&[b"A\nB"]), ["A", "B"]);
    }

    #[test]
    fn blank_lines_are_suppressed() {
        assert_eq!(frame_chunks(&[b"A\n\n  \nB\n"]), ["A", "B"]);
    }

    #[test]
    fn crlf_terminators_are_tolerated() {
        assert_eq!(frame_chunks(&[b"A\r\nB\r\n"]), ["A", "B"]);
    }

    #[test]
    fn multibyte_char_split_across_chunks_survives() {
        let input = "héllo\nwörld\n".as_bytes();
        // Cut inside the two-byte 'é'.
        let lines = frame_chunks(&[&input[..2], &input[2..]]);
        assert_eq!(lines, ["héllo", "wörld"]);
    }

    #[test]
    fn pending_reports_retained_tail() {
        let mut framer = LineFramer::new();
        framer.push(b"partial");
        assert_eq!(framer.pending(), 7);
        framer.push(b" line\n");
        assert_eq!(framer.pending(), 0);
    }
}
