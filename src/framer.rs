//! Delimiter-based line framing.
//!
//! `LineFramer` turns an unbounded byte stream into text records split on a
//! fixed delimiter. Bytes after the last delimiter are carried over until more
//! data arrives or the stream ends and `flush` is called.

use memchr::memmem;
use thiserror::Error;

/// Errors raised when building a framer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("record delimiter must not be empty")]
    EmptyDelimiter,
}

/// Stateful splitter for delimiter-terminated text records.
///
/// Framing happens on raw bytes and each record is decoded as UTF-8 (lossy)
/// afterwards, so a multi-byte character split across two chunks still
/// decodes correctly.
///
/// # Example
/// ```
/// use serial_line_controller::framer::LineFramer;
///
/// let mut framer = LineFramer::new("\n").unwrap();
/// assert!(framer.transform(b"AB").is_empty());
/// assert_eq!(framer.transform(b"CD\nEF\nGH"), vec!["ABCD", "EF"]);
/// assert_eq!(framer.flush(), "GH");
/// ```
#[derive(Debug, Clone)]
pub struct LineFramer {
    pending: Vec<u8>,
    delimiter: Vec<u8>,
    finder: memmem::Finder<'static>,
}

impl LineFramer {
    /// Create a framer splitting on `delimiter` (e.g. `"\n"`, `"\r\n"`).
    pub fn new(delimiter: &str) -> Result<Self, FramingError> {
        if delimiter.is_empty() {
            return Err(FramingError::EmptyDelimiter);
        }
        let delimiter = delimiter.as_bytes().to_vec();
        let finder = memmem::Finder::new(&delimiter).into_owned();
        Ok(Self {
            pending: Vec::new(),
            delimiter,
            finder,
        })
    }

    /// Append a chunk and return every record it completes, in arrival order.
    pub fn transform(&mut self, chunk: &[u8]) -> Vec<String> {
        // The carried-over bytes hold no complete delimiter, so a match can
        // start at most `delimiter.len() - 1` bytes before the new data.
        let mut cursor = self
            .pending
            .len()
            .saturating_sub(self.delimiter.len() - 1);
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.finder.find(&self.pending[cursor..]) {
            let end = cursor + offset;
            records.push(decode(&self.pending[start..end]));
            start = end + self.delimiter.len();
            cursor = start;
        }
        self.pending.drain(..start);
        records
    }

    /// Emit whatever is buffered, even if empty. Called once the producer
    /// guarantees no more data follows.
    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        decode(&rest)
    }

    /// Number of bytes waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Expand the escapes people type for delimiters in config files and on the
/// command line: `\n`, `\r`, `\t` and `\\`. Unknown escapes are kept verbatim.
pub fn unescape_delimiter(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chunks_joined_across_boundaries() {
        let mut framer = LineFramer::new("\n").unwrap();
        let mut records = Vec::new();
        for chunk in ["AB", "CD\n", "EF\nGH\nIJ"] {
            records.extend(framer.transform(chunk.as_bytes()));
        }
        assert_eq!(records, vec!["ABCD", "EF", "GH"]);
        assert_eq!(framer.flush(), "IJ");
    }

    #[test]
    fn test_flush_emits_once() {
        let mut framer = LineFramer::new("\n").unwrap();
        framer.transform(b"ab");
        framer.transform(b"c");
        assert_eq!(framer.flush(), "abc");
        assert_eq!(framer.flush(), "");
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_flush_empty_when_terminated() {
        let mut framer = LineFramer::new("\n").unwrap();
        assert_eq!(framer.transform(b"done\n"), vec!["done"]);
        assert_eq!(framer.flush(), "");
    }

    #[test]
    fn test_multi_byte_delimiter_split_across_chunks() {
        let mut framer = LineFramer::new("\r\n").unwrap();
        assert!(framer.transform(b"OK\r").is_empty());
        assert_eq!(framer.transform(b"\nREADY\r\n"), vec!["OK", "READY"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_reversed_pair_delimiter() {
        let mut framer = LineFramer::new("\n\r").unwrap();
        assert_eq!(framer.transform(b"a\n\rb\r\nc\n\r"), vec!["a", "b\r\nc"]);
    }

    #[test]
    fn test_consecutive_delimiters_yield_empty_records() {
        let mut framer = LineFramer::new("\n").unwrap();
        assert_eq!(framer.transform(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let mut framer = LineFramer::new("\n").unwrap();
        let bytes = "temp 21°C\n".as_bytes();
        let split = bytes.len() - 3; // inside the two-byte degree sign
        assert!(framer.transform(&bytes[..split]).is_empty());
        assert_eq!(framer.transform(&bytes[split..]), vec!["temp 21°C"]);
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        assert_eq!(LineFramer::new("").unwrap_err(), FramingError::EmptyDelimiter);
    }

    #[test]
    fn test_unescape_delimiter() {
        assert_eq!(unescape_delimiter("\\n"), "\n");
        assert_eq!(unescape_delimiter("\\r\\n"), "\r\n");
        assert_eq!(unescape_delimiter("\\n\\r"), "\n\r");
        assert_eq!(unescape_delimiter(";"), ";");
        assert_eq!(unescape_delimiter("\\x"), "\\x");
        assert_eq!(unescape_delimiter("\\\\"), "\\");
    }
}
