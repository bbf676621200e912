use std::fmt;
use tracing::warn;

/// Default bound on bytes buffered without a terminator
pub const MAX_PENDING: usize = 64 * 1024;

/// One terminator-delimited chunk of device output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line(String);

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Decode raw bytes, replacing invalid UTF-8 sequences
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison after trimming surrounding whitespace.
    pub fn matches_terminator(&self, terminator: &str) -> bool {
        self.0.trim() == terminator
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental splitter turning arbitrary byte chunks into [`Line`]s.
///
/// The terminator itself is dropped, and so are empty chunks between two
/// adjacent terminators. A terminator split across two `push` calls is
/// still recognised because unterminated bytes stay buffered, up to
/// `max_pending` bytes; beyond that the oldest bytes are dropped.
#[derive(Debug)]
pub struct LineSplitter {
    terminator: Vec<u8>,
    buffer: Vec<u8>,
    max_pending: usize,
}

impl LineSplitter {
    pub fn new(terminator: &str) -> Self {
        Self::with_max_pending(terminator, MAX_PENDING)
    }

    pub fn with_max_pending(terminator: &str, max_pending: usize) -> Self {
        Self {
            terminator: terminator.as_bytes().to_vec(),
            buffer: Vec::new(),
            max_pending,
        }
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Line> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = find(&self.buffer[start..], &self.terminator) {
            let chunk = &self.buffer[start..start + offset];
            if !chunk.is_empty() {
                lines.push(Line::from_bytes(chunk));
            }
            start += offset + self.terminator.len();
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_pending {
            // Keep enough of the tail to complete a terminator split across chunks
            let keep = self.terminator.len().saturating_sub(1).min(self.buffer.len());
            let dropped = self.buffer.len() - keep;
            warn!(
                dropped,
                head = %hex::encode(&self.buffer[..dropped.min(16)]),
                "Discarding unterminated input over {} bytes",
                self.max_pending
            );
            self.buffer.drain(..dropped);
        }

        lines
    }

    /// Bytes received after the last terminator
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Flush the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<Line> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = Line::from_bytes(&self.buffer);
        self.buffer.clear();
        Some(line)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
