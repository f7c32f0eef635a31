//! Import and export job orchestration.
//!
//! Wires splitting, validation, transformation, staging, and store
//! I/O into the two engine entry points.

pub mod export;
pub mod import;

pub use export::{ExportService, ExportSpec};
pub use import::{ImportOptions, ImportService};
