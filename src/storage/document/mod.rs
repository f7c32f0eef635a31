//! Document store backends.
//!
//! The [`DocumentStore`] trait is the write/read seam for the engine:
//! import pushes mappings and bulk batches through it, export streams
//! pages back out. Two backends implement it — an HTTP client for an
//! Elasticsearch-compatible store and an in-memory store for tests and
//! dry runs.

mod http;
mod memory;
mod traits;

pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;
pub use traits::{DocumentPage, DocumentStore, WriteMode};
