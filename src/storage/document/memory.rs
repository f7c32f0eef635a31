//! In-memory document store for testing.
//!
//! Provides a fast, non-persistent implementation of [`DocumentStore`]
//! for unit and integration tests. Tables are created on first mapping
//! push or write, and scroll order is the id order.

use super::traits::{DocumentPage, DocumentStore, WriteMode};
use crate::models::{ColumnTypeSpec, Document};
use crate::schema::columns_from_mapping;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct TableState {
    columns: ColumnTypeSpec,
    docs: BTreeMap<String, Document>,
}

/// In-memory document store for testing.
///
/// Uses `RwLock` for thread-safe access. Data is not persisted between
/// runs. Queries support the `{"term": {field: value}}` shape; any other
/// query document matches everything.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<HashMap<String, TableState>>,
}

impl MemoryDocumentStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a table.
    #[must_use]
    pub fn doc_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).map(|t| t.docs.len()))
            .unwrap_or(0)
    }

    /// Fetches one document by id, for test assertions.
    #[must_use]
    pub fn get_doc(&self, table: &str, id: &str) -> Option<Document> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).and_then(|t| t.docs.get(id).cloned()))
    }

    fn matches(doc: &Document, query: Option<&Value>) -> bool {
        let Some(query) = query else { return true };
        if let Some(term) = query.get("term").and_then(Value::as_object) {
            return term
                .iter()
                .all(|(field, expected)| doc.get(field) == Some(expected));
        }
        true
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn schema(&self, table: &str) -> Result<Option<ColumnTypeSpec>> {
        let tables = self.tables.read().map_err(|_| Error::OperationFailed {
            operation: "schema".to_string(),
            cause: "lock poisoned".to_string(),
        })?;
        Ok(tables.get(table).map(|t| t.columns.clone()))
    }

    fn put_mapping(&self, table: &str, mapping: &Value) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Error::OperationFailed {
            operation: "put_mapping".to_string(),
            cause: "lock poisoned".to_string(),
        })?;
        let state = tables.entry(table.to_string()).or_default();
        for (name, column) in columns_from_mapping(mapping) {
            state.columns.insert(name, column);
        }
        Ok(())
    }

    fn bulk_write(
        &self,
        table: &str,
        batch: &[(String, Document)],
        mode: WriteMode,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| Error::OperationFailed {
            operation: "bulk_write".to_string(),
            cause: "lock poisoned".to_string(),
        })?;
        let state = tables.entry(table.to_string()).or_default();
        for (id, doc) in batch {
            match mode {
                WriteMode::Replace => {
                    state.docs.insert(id.clone(), doc.clone());
                }
                WriteMode::Upsert => {
                    state
                        .docs
                        .entry(id.clone())
                        .or_default()
                        .extend(doc.clone());
                }
            }
        }
        Ok(())
    }

    fn read_page(
        &self,
        table: &str,
        query: Option<&Value>,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<DocumentPage> {
        let tables = self.tables.read().map_err(|_| Error::OperationFailed {
            operation: "read_page".to_string(),
            cause: "lock poisoned".to_string(),
        })?;
        let state = tables.get(table).ok_or_else(|| Error::OperationFailed {
            operation: "read_page".to_string(),
            cause: format!("unknown table '{table}'"),
        })?;

        let mut docs = Vec::new();
        let mut last_id: Option<&String> = None;
        for (id, doc) in &state.docs {
            if let Some(after) = cursor
                && id.as_str() <= after
            {
                continue;
            }
            if !Self::matches(doc, query) {
                continue;
            }
            docs.push(doc.clone());
            last_id = Some(id);
            if docs.len() == size {
                break;
            }
        }
        let cursor = if docs.len() == size {
            last_id.cloned()
        } else {
            None
        };
        Ok(DocumentPage { docs, cursor })
    }
}
