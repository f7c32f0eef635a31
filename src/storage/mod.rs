//! Storage layer abstraction.
//!
//! This module provides the two persistence seams of the engine:
//! - **Document store**: the schema-on-write target of imports and the
//!   source of exports (HTTP backend, in-memory backend for tests)
//! - **Template store**: local `SQLite` persistence for reusable
//!   import/export templates and saved queries
//!
//! The document store can be wrapped in a [`BulkheadStore`] to cap
//! concurrent calls from flush worker pools.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod bulkhead;
mod document;
mod template;

pub use bulkhead::{BulkheadStore, BulkheadStoreConfig};
pub use document::{
    DocumentPage, DocumentStore, HttpDocumentStore, MemoryDocumentStore, WriteMode,
};
pub use template::{QuerySource, SqliteTemplateStore, TemplateStore};
