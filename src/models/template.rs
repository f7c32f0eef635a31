//! Reusable import/export configurations.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use super::{ColumnType, ColumnTypeSpec, Document, Transform};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Default separator for composing document ids from primary-key values.
pub const DEFAULT_PRIMARY_KEY_DELIMITER: &str = "-";

static STORE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z\d][a-z\d._+-]*$").expect("static regex: store name")
});

/// A persisted, reusable import/export configuration.
///
/// Templates are owned by the template store and referenced by id from
/// headless jobs; a running job works on a snapshot and never observes
/// later edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Persistence id; `None` until first saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Human-readable template name.
    pub name: String,
    /// Id of the target store this template writes to or reads from.
    pub store_id: i64,
    /// Store collection (index) name.
    pub store_name: String,
    /// Table name within the collection.
    pub table_name: String,
    /// Source column names in source order (CSV column positions).
    pub original_names: Vec<String>,
    /// Declared field-name → type contract.
    pub column_types: ColumnTypeSpec,
    /// Declared primary-key columns; non-empty, each a declared column.
    pub primary_keys: Vec<String>,
    /// Separator joining primary-key values into a document id.
    #[serde(default = "default_delimiter")]
    pub primary_key_delimiter: String,
    /// Ordered transform pipeline applied to every record.
    #[serde(default)]
    pub transformations: Vec<Transform>,
    /// True for export templates, false for import templates.
    #[serde(default)]
    pub export: bool,
}

fn default_delimiter() -> String {
    DEFAULT_PRIMARY_KEY_DELIMITER.to_string()
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Template {
    /// Creates a minimal import template for the given table.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        store_id: i64,
        store_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            store_id,
            store_name: store_name.into(),
            table_name: table_name.into(),
            original_names: Vec::new(),
            column_types: ColumnTypeSpec::new(),
            primary_keys: Vec::new(),
            primary_key_delimiter: default_delimiter(),
            transformations: Vec::new(),
            export: false,
        }
    }

    /// Adds a declared column.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, column: ColumnType) -> Self {
        self.column_types.insert(name.into(), column);
        self
    }

    /// Declares the primary-key columns.
    #[must_use]
    pub fn with_primary_keys(mut self, keys: Vec<String>) -> Self {
        self.primary_keys = keys;
        self
    }

    /// Declares the source column order.
    #[must_use]
    pub fn with_original_names(mut self, names: Vec<String>) -> Self {
        self.original_names = names;
        self
    }

    /// Appends a transform to the pipeline.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transformations.push(transform);
        self
    }

    /// Marks this as an export template.
    #[must_use]
    pub const fn for_export(mut self) -> Self {
        self.export = true;
        self
    }

    /// Renders the store document id for one record.
    ///
    /// Primary-key values are joined with the configured delimiter;
    /// string values contribute their raw text, other values their JSON
    /// rendering. Validation guarantees the values are present and
    /// non-empty by the time ids are built.
    #[must_use]
    pub fn document_id(&self, doc: &Document) -> String {
        let parts: Vec<String> = self
            .primary_keys
            .iter()
            .map(|key| doc.get(key).map_or_else(String::new, key_text))
            .collect();
        parts.join(&self.primary_key_delimiter)
    }

    /// Verifies the whole configuration before any I/O happens.
    ///
    /// Checks store/table/field naming rules, column distinctness, the
    /// primary-key contract, descriptor invariants, and transform
    /// argument shape. Any failure aborts the owning job with no
    /// partial writes.
    pub fn validate(&self) -> Result<()> {
        validate_store_name(&self.store_name)?;
        validate_table_name(&self.table_name)?;

        if self.column_types.is_empty() {
            return Err(Error::InvalidInput(
                "at least one column type must be declared".to_string(),
            ));
        }
        for (name, column) in &self.column_types {
            validate_field_name(name)?;
            column.validate(name)?;
        }

        let distinct: BTreeSet<&str> = self.original_names.iter().map(String::as_str).collect();
        if distinct.len() != self.original_names.len() {
            return Err(Error::InvalidInput(
                "provided column names must be distinct".to_string(),
            ));
        }

        if self.primary_keys.is_empty() {
            return Err(Error::InvalidInput(
                "at least one column must be specified as a primary key".to_string(),
            ));
        }
        for key in &self.primary_keys {
            if !self.column_types.contains_key(key) {
                return Err(Error::InvalidInput(format!(
                    "the column '{key}' was specified to be part of the primary key, so it must be declared"
                )));
            }
        }

        for transform in &self.transformations {
            transform.validate()?;
        }
        Ok(())
    }
}

/// Checks a store collection (index) name against the store's rules.
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "store name cannot be an empty string".to_string(),
        ));
    }
    if name != name.to_lowercase() {
        return Err(Error::InvalidInput(
            "store name may not contain uppercase letters".to_string(),
        ));
    }
    if !STORE_NAME_RE.is_match(name) {
        return Err(Error::InvalidInput(
            "store name may only contain lowercase letters, digits, periods, underscores, dashes, and pluses, and must start with a letter or digit"
                .to_string(),
        ));
    }
    Ok(())
}

/// Checks a table name.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "table name cannot be an empty string".to_string(),
        ));
    }
    if name.starts_with('_') {
        return Err(Error::InvalidInput(
            "table name may not start with an underscore".to_string(),
        ));
    }
    Ok(())
}

/// Checks a declared field name.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "field name cannot be an empty string".to_string(),
        ));
    }
    if name.starts_with('_') {
        return Err(Error::InvalidInput(
            "field name may not start with an underscore".to_string(),
        ));
    }
    if name.contains('.') {
        return Err(Error::InvalidInput(
            "field name may not contain periods".to_string(),
        ));
    }
    Ok(())
}

/// Filter for listing persisted templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    /// Restrict to templates targeting this store id.
    pub store_id: Option<i64>,
    /// Restrict to templates targeting this table.
    pub table_name: Option<String>,
    /// Restrict to import templates (`Some(false)`) or export templates
    /// (`Some(true)`).
    pub export: Option<bool>,
}

impl TemplateFilter {
    /// Creates an unrestricted filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            store_id: None,
            table_name: None,
            export: None,
        }
    }

    /// Restricts to one store id.
    #[must_use]
    pub const fn with_store_id(mut self, store_id: i64) -> Self {
        self.store_id = Some(store_id);
        self
    }

    /// Restricts to one table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Restricts by template direction.
    #[must_use]
    pub const fn with_export(mut self, export: bool) -> Self {
        self.export = Some(export);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;

    fn sample() -> Template {
        Template::new("people", 1, "catalog", "people")
            .with_column("id", ColumnType::scalar(FieldType::Long))
            .with_column("name", ColumnType::scalar(FieldType::Text))
            .with_original_names(vec!["id".to_string(), "name".to_string()])
            .with_primary_keys(vec!["id".to_string()])
    }

    #[test]
    fn test_valid_template_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let mut t = sample();
        t.primary_keys.clear();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("primary key"));
    }

    #[test]
    fn test_primary_key_must_be_declared() {
        let mut t = sample();
        t.primary_keys = vec!["missing".to_string()];
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_duplicate_original_names_rejected() {
        let mut t = sample();
        t.original_names = vec!["id".to_string(), "id".to_string()];
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn test_store_name_rules() {
        assert!(validate_store_name("logs-2023.q1").is_ok());
        assert!(validate_store_name("Logs").is_err());
        assert!(validate_store_name("_logs").is_err());
        assert!(validate_store_name("").is_err());
    }

    #[test]
    fn test_field_name_rules() {
        assert!(validate_field_name("first_name").is_ok());
        assert!(validate_field_name("_hidden").is_err());
        assert!(validate_field_name("a.b").is_err());
        assert!(validate_field_name("").is_err());
    }

    #[test]
    fn test_document_id_joins_key_values() {
        let mut t = sample();
        let doc: Document = serde_json::from_str(r#"{"id": 7, "name": "ada"}"#).unwrap();
        assert_eq!(t.document_id(&doc), "7");

        t.primary_keys = vec!["id".to_string(), "name".to_string()];
        assert_eq!(t.document_id(&doc), "7-ada");

        t.primary_key_delimiter = "::".to_string();
        assert_eq!(t.document_id(&doc), "7::ada");
    }

    #[test]
    fn test_serde_defaults() {
        let raw = r#"{
            "name": "t",
            "store_id": 2,
            "store_name": "cat",
            "table_name": "tab",
            "original_names": [],
            "column_types": {"id": {"type": "long"}},
            "primary_keys": ["id"]
        }"#;
        let t: Template = serde_json::from_str(raw).unwrap();
        assert_eq!(t.primary_key_delimiter, DEFAULT_PRIMARY_KEY_DELIMITER);
        assert!(t.transformations.is_empty());
        assert!(!t.export);
        assert!(t.id.is_none());
    }
}
