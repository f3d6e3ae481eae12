//! Rebuilding lines from arbitrarily chunked writes.

use std::collections::VecDeque;

/// Buffers bytes until a `\n` arrives.
///
/// Lines are kept as raw bytes until complete, so a multi-byte UTF-8
/// character split across two writes decodes correctly. Invalid UTF-8 is
/// replaced, never rejected.
///
/// Completed lines wait in a queue until taken with
/// [`LineAssembler::next_line`], so a consumer that stops halfway keeps the
/// rest for later.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes`, queueing every line they complete with terminators
    /// stripped (`\n`, and a `\r` right before it).
    pub fn push(&mut self, bytes: &[u8]) {
        // Bytes already buffered contain no terminator.
        let mut search_from = self.partial.len();
        self.partial.extend_from_slice(bytes);

        let mut line_start = 0;
        while let Some(offset) = self.partial[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            self.ready.push_back(decode(&self.partial[line_start..end]));
            line_start = end + 1;
            search_from = line_start;
        }
        self.partial.drain(..line_start);
    }

    /// Oldest completed line not yet taken.
    pub fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Append `bytes` and take every completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.push(bytes);
        self.ready.drain(..).collect()
    }

    /// Take the unterminated remainder, if any. Called once the stream
    /// has closed and the queue is empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(decode(&rest))
    }

    /// Number of buffered bytes not yet part of a complete line.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Number of completed lines waiting to be taken.
    pub fn queued(&self) -> usize {
        self.ready.len()
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_lines_in_one_chunk() {
        let mut a = LineAssembler::new();
        assert_eq!(a.feed(b"one\ntwo\n"), vec!["one", "two"]);
        assert_eq!(a.pending(), 0);
        assert!(a.flush().is_none());
    }

    #[test]
    fn line_split_across_writes() {
        let mut a = LineAssembler::new();
        assert!(a.feed(b"Running scr").is_empty());
        assert!(a.feed(b"ipt: /build").is_empty());
        assert_eq!(a.feed(b".sh\nScript"), vec!["Running script: /build.sh"]);
        assert_eq!(a.pending(), "Script".len());
    }

    #[test]
    fn single_byte_writes() {
        let mut a = LineAssembler::new();
        let mut lines = Vec::new();
        for b in b"ab\ncd\n" {
            lines.extend(a.feed(std::slice::from_ref(b)));
        }
        assert_eq!(lines, vec!["ab", "cd"]);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut a = LineAssembler::new();
        assert_eq!(a.feed(b"windows\r\n"), vec!["windows"]);
        a.feed(b"split\r");
        assert_eq!(a.feed(b"\n"), vec!["split"]);
    }

    #[test]
    fn empty_lines_are_kept() {
        let mut a = LineAssembler::new();
        assert_eq!(a.feed(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn flush_yields_partial_once() {
        let mut a = LineAssembler::new();
        a.feed(b"done\nno newline");
        assert_eq!(a.flush().as_deref(), Some("no newline"));
        assert!(a.flush().is_none());
    }

    #[test]
    fn utf8_split_mid_character() {
        let text = "naïve ✓\n".as_bytes();
        let mut a = LineAssembler::new();
        let mut lines = Vec::new();
        for chunk in text.chunks(1) {
            lines.extend(a.feed(chunk));
        }
        assert_eq!(lines, vec!["naïve ✓"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut a = LineAssembler::new();
        let lines = a.feed(b"bad \xff byte\n");
        assert_eq!(lines, vec!["bad \u{fffd} byte"]);
    }

    #[test]
    fn queued_lines_survive_partial_consumption() {
        let mut a = LineAssembler::new();
        a.push(b"one\ntwo\nthr");
        assert_eq!(a.next_line().as_deref(), Some("one"));
        assert_eq!(a.queued(), 1);

        a.push(b"ee\n");
        assert_eq!(a.next_line().as_deref(), Some("two"));
        assert_eq!(a.next_line().as_deref(), Some("three"));
        assert!(a.next_line().is_none());
        assert_eq!(a.pending(), 0);
    }
}
