//! Line-aligned splitting for CSV input.

use super::{ChunkSplitter, carve_line_aligned, overlong_record};
use crate::Result;

/// Splits a CSV stream into payloads of whole lines.
///
/// When the stream declares a header row, the header line is consumed
/// before the first payload is cut, so every payload is pure data and
/// parses with the template's declared column order.
#[derive(Debug)]
pub struct CsvSplitter {
    threshold: usize,
    strip_header: bool,
    buffer: String,
}

impl CsvSplitter {
    /// Creates a splitter cutting near `threshold` bytes.
    #[must_use]
    pub fn new(threshold: usize, has_header: bool) -> Self {
        Self {
            threshold: threshold.max(1),
            strip_header: has_header,
            buffer: String::new(),
        }
    }
}

impl ChunkSplitter for CsvSplitter {
    fn feed(&mut self, window: &str) -> Result<Vec<String>> {
        self.buffer.push_str(window);

        if self.strip_header {
            let Some(pos) = self.buffer.find('\n') else {
                if self.buffer.len() >= self.threshold {
                    return Err(overlong_record(&self.buffer));
                }
                return Ok(Vec::new());
            };
            self.buffer.drain(..=pos);
            self.strip_header = false;
        }

        let mut payloads = Vec::new();
        while self.buffer.len() >= self.threshold {
            payloads.push(carve_line_aligned(&mut self.buffer, self.threshold)?);
        }
        Ok(payloads)
    }

    fn finish(&mut self) -> Result<Option<String>> {
        if self.strip_header {
            // The whole input fit on one line: it was the header.
            self.strip_header = false;
            self.buffer.clear();
            return Ok(None);
        }
        let tail = std::mem::take(&mut self.buffer);
        if tail.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(tail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(splitter: &mut CsvSplitter, input: &str) -> Vec<String> {
        let mut payloads = splitter.feed(input).unwrap();
        if let Some(tail) = splitter.finish().unwrap() {
            payloads.push(tail);
        }
        payloads
    }

    #[test]
    fn test_small_input_is_one_payload() {
        let mut splitter = CsvSplitter::new(1024, true);
        let payloads = drain(&mut splitter, "id,name\n1,ada\n2,grace\n");
        assert_eq!(payloads, vec!["1,ada\n2,grace\n".to_string()]);
    }

    #[test]
    fn test_header_survives_window_boundaries() {
        let mut splitter = CsvSplitter::new(1024, true);
        assert!(splitter.feed("id,na").unwrap().is_empty());
        assert!(splitter.feed("me\n1,ada\n").unwrap().is_empty());
        let tail = splitter.finish().unwrap();
        assert_eq!(tail.as_deref(), Some("1,ada\n"));
    }

    #[test]
    fn test_headerless_input_keeps_first_line() {
        let mut splitter = CsvSplitter::new(1024, false);
        let payloads = drain(&mut splitter, "1,ada\n2,grace\n");
        assert_eq!(payloads, vec!["1,ada\n2,grace\n".to_string()]);
    }

    #[test]
    fn test_threshold_cuts_on_line_boundaries() {
        let mut splitter = CsvSplitter::new(12, false);
        let mut payloads = Vec::new();
        for window in ["1,ada\n2,gra", "ce\n3,alan\n4,edsger\n"] {
            payloads.extend(splitter.feed(window).unwrap());
        }
        if let Some(tail) = splitter.finish().unwrap() {
            payloads.push(tail);
        }
        // Every payload ends on a line boundary and nothing is lost.
        assert!(payloads.len() > 1);
        for payload in &payloads {
            assert!(payload.ends_with('\n'));
        }
        assert_eq!(payloads.concat(), "1,ada\n2,grace\n3,alan\n4,edsger\n");
    }

    #[test]
    fn test_overlong_line_is_a_format_error() {
        let mut splitter = CsvSplitter::new(16, false);
        let long = format!("1,{}", "x".repeat(64));
        let err = splitter.feed(&long).unwrap_err();
        assert!(err.to_string().contains("no record boundary"));
    }

    #[test]
    fn test_header_only_input_yields_no_payloads() {
        let mut splitter = CsvSplitter::new(1024, true);
        assert!(splitter.feed("id,name").unwrap().is_empty());
        assert!(splitter.finish().unwrap().is_none());
    }

    #[test]
    fn test_empty_input_yields_no_payloads() {
        let mut splitter = CsvSplitter::new(1024, false);
        assert!(splitter.feed("").unwrap().is_empty());
        assert!(splitter.finish().unwrap().is_none());
    }
}
