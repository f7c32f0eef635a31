//! Record-aligned chunking of import streams.
//!
//! An import never holds the whole input in memory: the reader thread
//! feeds windows of decoded text into a [`ChunkSplitter`], which cuts
//! the stream into payloads of at most the configured chunk threshold,
//! always on a record boundary. Cut points depend only on the input
//! bytes and the threshold, never on how the windows were sized, so a
//! re-run over the same input stages identical chunks. Each payload
//! parses on its own: CSV chunks are whole lines (the header line is
//! removed before the first cut), JSON array chunks are re-wrapped in
//! brackets so they form a complete top-level array again.
//!
//! Input that cannot be cut on a record boundary within the threshold,
//! such as a single overlong record, is a format error and fails the
//! job.

mod csv;
mod json;

pub use csv::CsvSplitter;
pub use json::{JsonArraySplitter, NdjsonSplitter};

use crate::models::FileKind;
use crate::{Error, Result};

/// One record-aligned slice of the input stream.
///
/// Indices are assigned in stream order and double as staging file
/// names, so replay preserves input order per chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the stream.
    pub index: usize,
    /// Record-aligned text that parses independently of its siblings.
    pub payload: String,
    /// Set on the final chunk of the stream.
    pub is_last: bool,
}

/// Incremental splitter fed by the reader thread.
///
/// Implementations keep the unfinished tail of the previous window
/// buffered internally and only hand back payloads that end on a
/// record boundary.
pub trait ChunkSplitter: Send {
    /// Absorbs one window of input text.
    ///
    /// # Returns
    ///
    /// Zero or more completed payloads. A window smaller than the
    /// threshold usually completes nothing and is buffered whole.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the stream is malformed or
    /// a record exceeds the chunk threshold.
    fn feed(&mut self, window: &str) -> Result<Vec<String>>;

    /// Flushes the buffered tail as the final payload.
    ///
    /// # Returns
    ///
    /// The last payload, or `None` when the stream ended exactly on a
    /// previous boundary (or was empty).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the stream ends mid-record,
    /// such as an unterminated JSON array.
    fn finish(&mut self) -> Result<Option<String>>;
}

/// Picks the splitter for an input kind.
#[must_use]
pub fn splitter_for(
    kind: FileKind,
    threshold: usize,
    has_header: bool,
    newline_separated: bool,
) -> Box<dyn ChunkSplitter> {
    match kind {
        FileKind::Csv => Box::new(CsvSplitter::new(threshold, has_header)),
        FileKind::Json if newline_separated => Box::new(NdjsonSplitter::new(threshold)),
        FileKind::Json => Box::new(JsonArraySplitter::new(threshold)),
    }
}

/// Cuts the buffer after the last newline within the first `limit`
/// bytes, leaving the rest in place. The returned payload keeps its
/// line terminators.
pub(crate) fn carve_line_aligned(buffer: &mut String, limit: usize) -> Result<String> {
    let window = limit.min(buffer.len());
    let Some(pos) = buffer.as_bytes()[..window]
        .iter()
        .rposition(|&b| b == b'\n')
    else {
        return Err(overlong_record(buffer));
    };
    let rest = buffer.split_off(pos + 1);
    Ok(std::mem::replace(buffer, rest))
}

/// Format error for a record that outgrew the chunk threshold.
pub(crate) fn overlong_record(fragment: &str) -> Error {
    Error::InvalidInput(format!(
        "no record boundary within {} bytes of input starting with: {}",
        fragment.len(),
        snippet(fragment)
    ))
}

/// First part of an offending fragment, for error messages.
pub(crate) fn snippet(fragment: &str) -> String {
    const LIMIT: usize = 60;
    let trimmed = fragment.trim_start();
    match trimmed.char_indices().nth(LIMIT) {
        Some((pos, _)) => format!("{}...", &trimmed[..pos]),
        None => trimmed.to_string(),
    }
}
