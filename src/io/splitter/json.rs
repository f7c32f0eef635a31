//! Record-aligned splitting for JSON input.
//!
//! The array splitter is a character-level state machine rather than a
//! parser: it only tracks string state, escapes, and brace/bracket
//! depth, which is exactly enough to find the commas that separate
//! top-level records. Each payload is re-wrapped in brackets so it
//! decodes as a complete JSON array on its own.

use super::{ChunkSplitter, carve_line_aligned, overlong_record, snippet};
use crate::{Error, Result};

/// Scan position relative to the top-level array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before the opening bracket; only whitespace is legal.
    BeforeArray,
    /// Between the outer brackets, scanning records.
    InArray,
    /// After the closing bracket; only whitespace is legal.
    AfterArray,
}

/// Splits a top-level JSON array of records into bracket-wrapped
/// payloads, cutting only at commas that separate records.
#[derive(Debug)]
pub struct JsonArraySplitter {
    threshold: usize,
    phase: Phase,
    /// Buffered record text with the outer brackets stripped.
    buffer: String,
    object_depth: usize,
    array_depth: usize,
    in_string: bool,
    escaped: bool,
    /// Byte offsets of record separators in `buffer`, ascending.
    boundaries: Vec<usize>,
}

impl JsonArraySplitter {
    /// Creates a splitter cutting near `threshold` bytes.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            phase: Phase::BeforeArray,
            buffer: String::new(),
            object_depth: 0,
            array_depth: 0,
            in_string: false,
            escaped: false,
            boundaries: Vec::new(),
        }
    }

    /// Cuts the buffer at the last record separator within the
    /// threshold and wraps the cut part in brackets. The separator is
    /// verified at the head of the remainder, then dropped so the next
    /// payload starts on a record.
    fn carve(&mut self) -> Result<String> {
        let eligible = self.boundaries.partition_point(|&b| b <= self.threshold);
        if eligible == 0 {
            return Err(overlong_record(&self.buffer));
        }
        let cut = self.boundaries[eligible - 1];
        let rest = self.buffer.split_off(cut);
        let payload = std::mem::replace(&mut self.buffer, rest);
        if !self.buffer.starts_with(',') {
            return Err(Error::InvalidInput(format!(
                "chunk remainder does not resume at a record separator: {}",
                snippet(&self.buffer)
            )));
        }
        self.buffer.remove(0);
        self.boundaries.retain(|&b| b > cut);
        for boundary in &mut self.boundaries {
            *boundary -= cut + 1;
        }
        Ok(format!("[{payload}]"))
    }

    /// Advances the machine by one character inside the array,
    /// returning `true` when the character closed the outer array.
    fn scan(&mut self, ch: char) -> Result<bool> {
        if self.in_string {
            self.buffer.push(ch);
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return Ok(false);
        }
        match ch {
            '"' => {
                self.in_string = true;
                self.buffer.push(ch);
            }
            '{' => {
                self.object_depth += 1;
                self.buffer.push(ch);
            }
            '}' => {
                if self.object_depth == 0 {
                    return Err(Error::InvalidInput(format!(
                        "unbalanced '}}' in JSON input: {}",
                        snippet(&self.buffer)
                    )));
                }
                self.object_depth -= 1;
                self.buffer.push(ch);
            }
            '[' => {
                self.array_depth += 1;
                self.buffer.push(ch);
            }
            ']' => {
                if self.array_depth > 0 {
                    self.array_depth -= 1;
                    self.buffer.push(ch);
                } else if self.object_depth > 0 {
                    return Err(Error::InvalidInput(format!(
                        "unbalanced ']' in JSON input: {}",
                        snippet(&self.buffer)
                    )));
                } else {
                    return Ok(true);
                }
            }
            ',' if self.object_depth == 0 && self.array_depth == 0 => {
                self.buffer.push(ch);
                self.boundaries.push(self.buffer.len() - 1);
            }
            _ => self.buffer.push(ch),
        }
        Ok(false)
    }
}

impl ChunkSplitter for JsonArraySplitter {
    fn feed(&mut self, window: &str) -> Result<Vec<String>> {
        for ch in window.chars() {
            match self.phase {
                Phase::BeforeArray => {
                    if ch.is_whitespace() {
                        continue;
                    }
                    if ch == '[' {
                        self.phase = Phase::InArray;
                        continue;
                    }
                    return Err(Error::InvalidInput(format!(
                        "input does not start with a JSON array: found '{ch}'"
                    )));
                }
                Phase::AfterArray => {
                    if ch.is_whitespace() {
                        continue;
                    }
                    return Err(Error::InvalidInput(format!(
                        "trailing content after the top-level JSON array: '{ch}'"
                    )));
                }
                Phase::InArray => {
                    if self.scan(ch)? {
                        self.phase = Phase::AfterArray;
                    }
                }
            }
        }
        let mut payloads = Vec::new();
        // Strictly greater: a separator can land at the threshold offset
        // itself, and it is only known once the buffer has grown past it.
        // Carving earlier would make cut points depend on window sizing.
        while self.buffer.len() > self.threshold {
            payloads.push(self.carve()?);
        }
        Ok(payloads)
    }

    fn finish(&mut self) -> Result<Option<String>> {
        match self.phase {
            // Empty or whitespace-only input carries zero records.
            Phase::BeforeArray => Ok(None),
            Phase::InArray => Err(Error::InvalidInput(format!(
                "unterminated JSON array: input ended at object depth {}, array depth {}",
                self.object_depth,
                self.array_depth + 1
            ))),
            Phase::AfterArray => {
                let tail = std::mem::take(&mut self.buffer);
                self.boundaries.clear();
                if tail.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(format!("[{tail}]")))
                }
            }
        }
    }
}

/// Splits newline-separated JSON records into payloads of whole lines.
///
/// Every line is a complete JSON document, so any newline is a safe
/// cut point; the machinery matches the CSV splitter minus the header.
#[derive(Debug)]
pub struct NdjsonSplitter {
    threshold: usize,
    buffer: String,
}

impl NdjsonSplitter {
    /// Creates a splitter cutting near `threshold` bytes.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: String::new(),
        }
    }
}

impl ChunkSplitter for NdjsonSplitter {
    fn feed(&mut self, window: &str) -> Result<Vec<String>> {
        self.buffer.push_str(window);
        let mut payloads = Vec::new();
        while self.buffer.len() >= self.threshold {
            payloads.push(carve_line_aligned(&mut self.buffer, self.threshold)?);
        }
        Ok(payloads)
    }

    fn finish(&mut self) -> Result<Option<String>> {
        let tail = std::mem::take(&mut self.buffer);
        if tail.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(tail))
        }
    }
}
