//! Import/Export I/O subsystem.
//!
//! Turns unbounded byte streams into validated documents and back.
//!
//! # Architecture
//!
//! An import flows through four stages, each its own module:
//!
//! - **Splitters** cut the raw stream into record-aligned chunks
//! - **Pipeline** applies the template's per-record transforms
//! - **Validation** projects, coerces, and type-checks every record
//! - **Services** orchestrate the stages against staging and the store
//!
//! Exports run the reverse path: store query pages are projected,
//! transformed, and serialized through the **writers** sinks.
//!
//! # Supported Formats
//!
//! | Format | Import | Export | Notes |
//! |--------|--------|--------|-------|
//! | CSV | ✓ | ✓ | Optional header row on import |
//! | JSON | ✓ | ✓ | Top-level array or newline-separated |
//!
//! # Examples
//!
//! ## Import a CSV stream
//!
//! ```rust,ignore
//! use sluice::{FileKind, ImportOptions, ImportService};
//! use std::fs::File;
//!
//! let file = File::open("people.csv")?;
//! let summary = service.upsert(file, &template, &ImportOptions::new(FileKind::Csv))?;
//! println!("wrote {} records", summary.record_count);
//! ```
//!
//! ## Export a query to CSV
//!
//! ```rust,ignore
//! use sluice::{ExportFormat, ExportSpec, ExportService};
//!
//! let spec = ExportSpec::from_template(&template, ExportFormat::Csv)
//!     .with_query(serde_json::json!({"match_all": {}}));
//! let summary = service.export_to_file("people.csv".as_ref(), &spec)?;
//! println!("exported {} documents", summary.documents);
//! ```

pub mod pipeline;
pub mod services;
pub mod splitter;
pub mod validation;
pub mod writers;

// Re-exports for convenience
pub use pipeline::TransformPipeline;
pub use services::export::{ExportService, ExportSpec};
pub use services::import::{ImportOptions, ImportService};
pub use splitter::{Chunk, ChunkSplitter, splitter_for};
pub use validation::RecordValidator;
pub use writers::{CsvSink, DocSink, ExportFormat, JsonSink};
