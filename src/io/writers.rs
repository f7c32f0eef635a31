//! Export serialization sinks.
//!
//! A sink turns the export stream into bytes: documents arrive one at
//! a time and the output stays valid once `finalize` runs, so exports
//! of any size stream without buffering the result.

use crate::models::Document;
use crate::{Error, Result};
use serde_json::Value;
use std::io::Write;

/// Output shape of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFormat {
    /// One header row of column names, then one row per document.
    Csv,
    /// A single JSON array of documents.
    Json,
    /// A JSON object holding the document array under the given key.
    JsonObject {
        /// Key the array is stored under.
        key: String,
    },
}

impl ExportFormat {
    /// Returns the format name used in logs and CLI output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::JsonObject { .. } => "json-object",
        }
    }

    /// Parses a bare format name. Object wrapping is a separate
    /// option, so only the two base names parse.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Streaming serializer for exported documents.
pub trait DocSink {
    /// Serializes one document.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the underlying output fails.
    fn write(&mut self, doc: &Document) -> Result<()>;

    /// Completes the output, flushing closing syntax.
    ///
    /// Consumes the sink; a finalized output is valid even when no
    /// document was written.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the underlying output fails.
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// CSV sink: a header row of the given columns, then one row per
/// document with cells in the same order.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    columns: Vec<String>,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    /// Creates a sink writing the given columns, in order.
    #[must_use]
    pub fn new(writer: W, columns: Vec<String>) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
            columns,
            header_written: false,
        }
    }

    fn ensure_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.writer
                .write_record(&self.columns)
                .map_err(write_failed)?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl<W: Write> DocSink for CsvSink<W> {
    fn write(&mut self, doc: &Document) -> Result<()> {
        self.ensure_header()?;
        let cells: Vec<String> = self.columns.iter().map(|col| cell_text(doc.get(col))).collect();
        self.writer.write_record(&cells).map_err(write_failed)
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.ensure_header()?;
        self.writer.flush().map_err(write_failed)
    }
}

/// Renders one cell: strings stay raw, nulls and absent values become
/// empty cells, everything else keeps its JSON rendering.
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// JSON sink: a streamed array of documents, optionally wrapped in an
/// object under a fixed key.
pub struct JsonSink<W: Write> {
    writer: W,
    wrap_key: Option<String>,
    started: bool,
}

impl<W: Write> JsonSink<W> {
    /// Creates a sink producing a bare array, or an object-wrapped one
    /// when a key is given.
    #[must_use]
    pub fn new(writer: W, wrap_key: Option<String>) -> Self {
        Self {
            writer,
            wrap_key,
            started: false,
        }
    }

    fn open(&mut self) -> Result<()> {
        if let Some(key) = &self.wrap_key {
            self.writer.write_all(b"{").map_err(write_failed)?;
            serde_json::to_writer(&mut self.writer, key).map_err(write_failed)?;
            self.writer.write_all(b":[").map_err(write_failed)?;
        } else {
            self.writer.write_all(b"[").map_err(write_failed)?;
        }
        self.started = true;
        Ok(())
    }
}

impl<W: Write> DocSink for JsonSink<W> {
    fn write(&mut self, doc: &Document) -> Result<()> {
        if self.started {
            self.writer.write_all(b",").map_err(write_failed)?;
        } else {
            self.open()?;
        }
        serde_json::to_writer(&mut self.writer, doc).map_err(write_failed)
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if !self.started {
            self.open()?;
        }
        self.writer.write_all(b"]").map_err(write_failed)?;
        if self.wrap_key.is_some() {
            self.writer.write_all(b"}").map_err(write_failed)?;
        }
        self.writer.flush().map_err(write_failed)
    }
}

fn write_failed(err: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "export_write".to_string(),
        cause: err.to_string(),
    }
}
