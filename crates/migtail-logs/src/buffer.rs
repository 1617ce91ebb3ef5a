use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;

use migtail_types::LogLine;

/// Default line capacity per session
pub const DEFAULT_CAPACITY: usize = 5000;

struct Inner {
    lines: VecDeque<LogLine>,
    /// Session-wide dedup set: the exact text of every line currently in
    /// the buffer, shared across all sources. Identical text from two
    /// different sources collapses to one entry by design.
    seen: HashSet<String>,
    next_sequence: u64,
}

/// Bounded, append-only line buffer coupled to its dedup set.
///
/// Both structures live behind one mutex: a duplicate check, the append,
/// any FIFO eviction, and the matching dedup-set removals are a single
/// atomic step. The set therefore always holds exactly the texts present
/// in the buffer and never grows past capacity.
pub struct DedupBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl DedupBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                lines: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                seen: HashSet::new(),
                next_sequence: 0,
            }),
            capacity,
        }
    }

    /// Append a line, returning whether it was newly added.
    ///
    /// A line is a duplicate iff its exact text is already present,
    /// regardless of source. On overflow the oldest entries are evicted
    /// and their texts removed from the set, so an evicted text showing
    /// up again later is treated as new.
    pub fn append(&self, source_id: &str, text: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(text.to_string()) {
            return false;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.lines.push_back(LogLine {
            source_id: source_id.to_string(),
            sequence,
            text: text.to_string(),
            received_at: Utc::now(),
        });

        while inner.lines.len() > self.capacity {
            if let Some(evicted) = inner.lines.pop_front() {
                inner.seen.remove(&evicted.text);
            }
        }

        true
    }

    /// All lines in append order (cloned for the consumer)
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.inner.lock().lines.iter().cloned().collect()
    }

    /// Lines appended after the given sequence number
    pub fn since(&self, sequence: u64) -> Vec<LogLine> {
        self.inner
            .lock()
            .lines
            .iter()
            .filter(|l| l.sequence > sequence)
            .cloned()
            .collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.inner.lock().seen.contains(text)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the dedup set; always equals `len()`
    pub fn dedup_len(&self) -> usize {
        self.inner.lock().seen.len()
    }
}

impl Default for DedupBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(buffer: &DedupBuffer) -> Vec<String> {
        buffer.snapshot().into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn duplicate_text_is_rejected_across_sources() {
        let buffer = DedupBuffer::new(10);
        assert!(buffer.append("pod-a", "hello"));
        assert!(!buffer.append("pod-a", "hello"));
        assert!(!buffer.append("pod-b", "hello"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn eviction_keeps_set_consistent() {
        let capacity = 8;
        let extra = 3;
        let buffer = DedupBuffer::new(capacity);
        for i in 0..capacity + extra {
            assert!(buffer.append("pod", &format!("line-{}", i)));
        }

        assert_eq!(buffer.len(), capacity);
        assert_eq!(buffer.dedup_len(), capacity);
        for i in 0..extra {
            let evicted = format!("line-{}", i);
            assert!(!buffer.contains(&evicted));
            // Evicted text is new again.
            assert!(buffer.append("pod", &evicted));
        }
    }

    #[test]
    fn capacity_three_scenario() {
        let buffer = DedupBuffer::new(3);
        for text in ["L1", "L2", "L3", "L4"] {
            buffer.append("pod", text);
        }
        assert_eq!(texts(&buffer), ["L2", "L3", "L4"]);

        assert!(buffer.append("pod", "L1"));
        assert_eq!(texts(&buffer), ["L3", "L4", "L1"]);
    }

    #[test]
    fn sequences_are_monotonic_across_eviction() {
        let buffer = DedupBuffer::new(2);
        buffer.append("pod", "a");
        buffer.append("pod", "b");
        buffer.append("pod", "c");
        let sequences: Vec<u64> = buffer.snapshot().iter().map(|l| l.sequence).collect();
        assert_eq!(sequences, [1, 2]);
    }

    #[test]
    fn since_returns_only_newer_lines() {
        let buffer = DedupBuffer::new(10);
        buffer.append("pod", "a");
        buffer.append("pod", "b");
        buffer.append("pod", "c");
        let newer = buffer.since(0);
        assert_eq!(newer.len(), 2);
        assert_eq!(newer[0].text, "b");
    }
}
