//! # Sluice
//!
//! A streaming import/export engine for schema-on-write document stores.
//!
//! Sluice ingests large CSV/JSON datasets under a user-declared column-type
//! contract, validates and transforms every record, and flushes the result
//! to a target document store with bounded concurrency and backpressure.
//! The reverse path streams store query results back out as CSV or JSON.
//!
//! ## Features
//!
//! - Record-aligned chunking of unbounded byte streams (CSV and JSON)
//! - Closed type lattice with inference for untyped sources
//! - Ordered per-record transform pipeline (rename, split, merge,
//!   duplicate, prepend/append, encrypt/decrypt, hash)
//! - Additive schema reconciliation against the store's live mapping
//! - Temp-file staging with bounded-concurrency replay and unconditional
//!   cleanup
//! - Reusable import/export templates persisted in SQLite
//!
//! ## Example
//!
//! ```rust,ignore
//! use sluice::{FileKind, ImportOptions, ImportService};
//!
//! let service = ImportService::new(store, config);
//! let options = ImportOptions::new(FileKind::Csv);
//! let summary = service.upsert(reader, &template, &options)?;
//! println!("staged {} chunks", summary.chunk_count);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
// Cannot be moved to function level. Current duplicates: reqwest/rusqlite transitive deps.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod schema;
pub mod security;
pub mod staging;
pub mod storage;

// Re-exports for convenience
pub use config::{CryptoSettings, SluiceConfig, StoreSettings};
pub use io::{
    ExportFormat, ExportService, ExportSpec, ImportOptions, ImportService, RecordValidator,
    TransformPipeline,
};
pub use models::{
    ColumnType, ColumnTypeSpec, Document, FieldType, FileKind, ImportSummary, JobState, Template,
    TemplateFilter, Transform,
};
pub use storage::{
    BulkheadStore, DocumentStore, HttpDocumentStore, MemoryDocumentStore, SqliteTemplateStore,
    TemplateStore, WriteMode,
};

/// Error type for sluice operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad configuration or a malformed stream: invalid names, bad cipher key length, unsplittable chunks |
/// | `OperationFailed` | I/O errors, store calls fail |
/// | `RecordRejected` | A record fails type validation or carries an empty primary key |
/// | `SchemaConflict` | A declared column type cannot be cast to the store's existing type |
/// | `TemplateNotFound` | A headless job references a template id that does not exist |
/// | `InvalidState` | An illegal job-state transition or a chunk double-write |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A table, column, or transform name fails validation
    /// - Declared primary keys are empty or not a subset of the columns
    /// - A transform is missing a required argument
    /// - Cipher key or hash salt material has the wrong length
    /// - The input stream is malformed: a record with no safe split
    ///   point, a bad carry-over, or truncated UTF-8
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Temp-file staging I/O fails
    /// - The target store rejects a mapping push or bulk write
    /// - `SQLite` template persistence fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A record failed validation and was rejected.
    ///
    /// Carries the record's positional index within the job and a cause
    /// naming the offending field with expected vs. actual type. Rejecting
    /// one record rejects its containing batch.
    #[error("record {record} rejected: {cause}")]
    RecordRejected {
        /// Zero-based record index within the import stream.
        record: usize,
        /// Description of the violation, naming the field.
        cause: String,
    },

    /// A declared column type conflicts with the store's existing schema.
    ///
    /// Raised before any mapping push or data write; mapping conflicts
    /// cannot be resolved per record.
    #[error("type mismatch for field '{field}': cannot cast \"{requested}\" to \"{existing}\"")]
    SchemaConflict {
        /// The conflicting field name.
        field: String,
        /// The type already present in the store.
        existing: String,
        /// The type the job declared.
        requested: String,
    },

    /// A referenced template does not exist.
    #[error("template {0} not found")]
    TemplateNotFound(i64),

    /// A job was driven through an illegal state transition.
    ///
    /// Raised when:
    /// - A chunk number is staged twice
    /// - Flush starts before the mapping push
    /// - Input arrives after the stream was finalized
    #[error("invalid job state '{state}' for {action}")]
    InvalidState {
        /// The state the job was in.
        state: String,
        /// The action that was attempted.
        action: String,
    },
}

/// Result type alias for sluice operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so template persistence and job summaries agree on a
/// clock. Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use sluice::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0); // Should be a reasonable Unix timestamp
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
