//! Document store trait definition.

use crate::Result;
use crate::models::{ColumnTypeSpec, Document};
use serde_json::Value;

/// Write behavior for bulk flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Merge the incoming document into any existing document with the
    /// same id, creating it when absent.
    Upsert,
    /// Overwrite any existing document with the same id.
    Replace,
}

impl WriteMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Replace => "replace",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of a scrolling read.
#[derive(Debug, Default)]
pub struct DocumentPage {
    /// Documents in this page, in store order.
    pub docs: Vec<Document>,
    /// Continuation token for the next page; `None` when the result
    /// stream is exhausted.
    pub cursor: Option<String>,
}

/// Trait for schema-on-write document store backends.
///
/// A store holds named tables of documents keyed by string ids, with a
/// per-table column schema that must be declared (or additively
/// extended) before writes. Implementations are shared across flush
/// workers, so every method takes `&self`.
pub trait DocumentStore: Send + Sync {
    /// Returns the backend name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Fetches the live column schema of a table.
    ///
    /// # Returns
    ///
    /// The table's declared columns, or `None` when the store does not
    /// know the table yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn schema(&self, table: &str) -> Result<Option<ColumnTypeSpec>>;

    /// Declares additional columns on a table.
    ///
    /// `mapping` is the store-native mapping document produced by
    /// [`crate::schema::mapping_for`]. Declaring a column the store
    /// already holds under the same type is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the mapping.
    fn put_mapping(&self, table: &str, mapping: &Value) -> Result<()>;

    /// Bulk-writes a batch of `(id, document)` pairs to a table.
    ///
    /// The batch is the atomicity unit the engine counts on for retry:
    /// implementations should reject the whole batch rather than write
    /// part of it.
    ///
    /// # Errors
    ///
    /// Returns an error if any write in the batch is refused.
    fn bulk_write(&self, table: &str, batch: &[(String, Document)], mode: WriteMode)
    -> Result<()>;

    /// Reads one page of documents from a table.
    ///
    /// # Arguments
    ///
    /// * `table` - The table to read.
    /// * `query` - Optional store-native query document; `None` reads
    ///   everything.
    /// * `cursor` - Continuation token from the previous page, `None`
    ///   for the first page.
    /// * `size` - Maximum documents per page.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown or the store cannot be
    /// reached.
    fn read_page(
        &self,
        table: &str,
        query: Option<&Value>,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<DocumentPage>;

    /// Returns the number of documents in a table, honoring an optional
    /// query.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn count(&self, table: &str, query: Option<&Value>) -> Result<u64> {
        let mut total = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.read_page(table, query, cursor.as_deref(), 1000)?;
            total += page.docs.len() as u64;
            match page.cursor {
                Some(next) if !page.docs.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(total)
    }
}
