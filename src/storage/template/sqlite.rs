//! SQLite-backed template persistence.
//!
//! Stores import/export templates and saved store queries in a single
//! database file. Compound template fields (column types, transforms,
//! primary keys) are stored as JSON text columns.

use super::traits::{QuerySource, TemplateStore};
use crate::models::{Template, TemplateFilter};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `SQLite`-backed store for templates and saved queries.
pub struct SqliteTemplateStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database.
    db_path: PathBuf,
}

impl SqliteTemplateStore {
    /// Opens (or creates) a template database at the given path.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the `SQLite` database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_template_db_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_template_db".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory template store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_template_db_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initializes the database schema and configures pragmas.
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        // Configure SQLite pragmas for performance and reliability
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                store_id INTEGER NOT NULL,
                store_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                original_names TEXT NOT NULL DEFAULT '[]',
                column_types TEXT NOT NULL DEFAULT '{}',
                primary_keys TEXT NOT NULL DEFAULT '[]',
                primary_key_delimiter TEXT NOT NULL DEFAULT '-',
                transformations TEXT NOT NULL DEFAULT '[]',
                export INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_templates_table".to_string(),
            cause: e.to_string(),
        })?;

        // Create index for the common store+table listing
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_templates_store_table
             ON templates(store_id, table_name)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_templates_index".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS saved_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_saved_queries_table".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Locks the connection and returns a guard.
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::OperationFailed {
            operation: "lock_template_db".to_string(),
            cause: e.to_string(),
        })
    }

    /// Persists a store query body and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    #[allow(clippy::cast_possible_wrap)]
    pub fn save_query(&self, body: &Value) -> Result<i64> {
        let conn = self.lock_conn()?;
        let now = crate::current_timestamp();
        conn.execute(
            "INSERT INTO saved_queries (body, created_at) VALUES (?1, ?2)",
            params![body.to_string(), now as i64],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "save_query".to_string(),
            cause: e.to_string(),
        })?;
        Ok(conn.last_insert_rowid())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
        let original_names: String = row.get(5)?;
        let column_types: String = row.get(6)?;
        let primary_keys: String = row.get(7)?;
        let transformations: String = row.get(9)?;
        Ok(Template {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            store_id: row.get(2)?,
            store_name: row.get(3)?,
            table_name: row.get(4)?,
            original_names: serde_json::from_str(&original_names).unwrap_or_default(),
            column_types: serde_json::from_str(&column_types).unwrap_or_default(),
            primary_keys: serde_json::from_str(&primary_keys).unwrap_or_default(),
            primary_key_delimiter: row.get(8)?,
            transformations: serde_json::from_str(&transformations).unwrap_or_default(),
            export: row.get(10)?,
        })
    }

    fn encode_compound(template: &Template) -> Result<(String, String, String, String)> {
        let encode = |operation: &str, value: serde_json::Result<String>| {
            value.map_err(|e| Error::OperationFailed {
                operation: operation.to_string(),
                cause: e.to_string(),
            })
        };
        Ok((
            encode(
                "serialize_original_names",
                serde_json::to_string(&template.original_names),
            )?,
            encode(
                "serialize_column_types",
                serde_json::to_string(&template.column_types),
            )?,
            encode(
                "serialize_primary_keys",
                serde_json::to_string(&template.primary_keys),
            )?,
            encode(
                "serialize_transformations",
                serde_json::to_string(&template.transformations),
            )?,
        ))
    }
}

const TEMPLATE_COLUMNS: &str = "id, name, store_id, store_name, table_name, original_names,
     column_types, primary_keys, primary_key_delimiter, transformations, export";

impl TemplateStore for SqliteTemplateStore {
    #[allow(clippy::cast_possible_wrap)]
    fn save(&self, template: &Template) -> Result<Template> {
        template.validate()?;
        let (original_names, column_types, primary_keys, transformations) =
            Self::encode_compound(template)?;

        let conn = self.lock_conn()?;
        let now = crate::current_timestamp();
        conn.execute(
            "INSERT INTO templates
             (name, store_id, store_name, table_name, original_names, column_types,
              primary_keys, primary_key_delimiter, transformations, export, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                template.name,
                template.store_id,
                template.store_name,
                template.table_name,
                original_names,
                column_types,
                primary_keys,
                template.primary_key_delimiter,
                transformations,
                template.export,
                now as i64,
            ],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "save_template".to_string(),
            cause: e.to_string(),
        })?;

        let mut stored = template.clone();
        stored.id = Some(conn.last_insert_rowid());
        Ok(stored)
    }

    fn get(&self, id: i64) -> Result<Option<Template>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"),
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_template".to_string(),
            cause: e.to_string(),
        })
    }

    fn list(&self, filter: &TemplateFilter) -> Result<Vec<Template>> {
        let conn = self.lock_conn()?;

        let mut sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(store_id) = filter.store_id {
            sql.push_str(" AND store_id = ?");
            params_vec.push(Box::new(store_id));
        }
        if let Some(table_name) = &filter.table_name {
            sql.push_str(" AND table_name = ?");
            params_vec.push(Box::new(table_name.clone()));
        }
        if let Some(export) = filter.export {
            sql.push_str(" AND export = ?");
            params_vec.push(Box::new(export));
        }

        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
            operation: "prepare_list_templates".to_string(),
            cause: e.to_string(),
        })?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(AsRef::as_ref).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), Self::map_row)
            .map_err(|e| Error::OperationFailed {
                operation: "list_templates".to_string(),
                cause: e.to_string(),
            })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| Error::OperationFailed {
                operation: "read_template_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(results)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn update(&self, template: &Template) -> Result<()> {
        let Some(id) = template.id else {
            return Err(Error::InvalidInput(
                "template must be saved before it can be updated".to_string(),
            ));
        };
        template.validate()?;
        let (original_names, column_types, primary_keys, transformations) =
            Self::encode_compound(template)?;

        let conn = self.lock_conn()?;
        let now = crate::current_timestamp();
        let rows_affected = conn
            .execute(
                "UPDATE templates SET
                 name = ?2, store_id = ?3, store_name = ?4, table_name = ?5,
                 original_names = ?6, column_types = ?7, primary_keys = ?8,
                 primary_key_delimiter = ?9, transformations = ?10, export = ?11,
                 updated_at = ?12
                 WHERE id = ?1",
                params![
                    id,
                    template.name,
                    template.store_id,
                    template.store_name,
                    template.table_name,
                    original_names,
                    column_types,
                    primary_keys,
                    template.primary_key_delimiter,
                    transformations,
                    template.export,
                    now as i64,
                ],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "update_template".to_string(),
                cause: e.to_string(),
            })?;

        if rows_affected == 0 {
            return Err(Error::TemplateNotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock_conn()?;
        let rows_affected = conn
            .execute("DELETE FROM templates WHERE id = ?1", params![id])
            .map_err(|e| Error::OperationFailed {
                operation: "delete_template".to_string(),
                cause: e.to_string(),
            })?;
        Ok(rows_affected > 0)
    }
}

impl QuerySource for SqliteTemplateStore {
    fn query_for(&self, id: i64) -> Result<Option<Value>> {
        let conn = self.lock_conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM saved_queries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::OperationFailed {
                operation: "get_saved_query".to_string(),
                cause: e.to_string(),
            })?;

        match body {
            Some(text) => {
                let value = serde_json::from_str(&text).map_err(|e| Error::OperationFailed {
                    operation: "parse_saved_query".to_string(),
                    cause: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
