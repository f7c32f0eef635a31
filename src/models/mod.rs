//! Data models for sluice.
//!
//! This module contains all the core data structures used throughout the system.

mod column;
mod field_type;
mod job;
mod template;
mod transform;

/// A schemaless record: declared field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub use column::{ColumnType, ColumnTypeSpec};
pub use field_type::FieldType;
pub use job::{ExportSummary, FileKind, ImportSummary, JobState};
pub use template::{
    DEFAULT_PRIMARY_KEY_DELIMITER, Template, TemplateFilter, validate_field_name,
    validate_store_name, validate_table_name,
};
pub use transform::Transform;
