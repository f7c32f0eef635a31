//! Declared-schema translation and store reconciliation.
//!
//! Before any data moves, a job's declared column set is translated into
//! the store's native mapping document and diffed field-by-field against
//! the live schema of the target table. Fields the store already knows
//! under a compatible type are dropped from the push; an incompatible
//! existing type fails the whole job.

use crate::models::{ColumnType, ColumnTypeSpec, FieldType};
use crate::{Error, Result};
use serde_json::{Value, json};

/// Builds the store-native mapping document for a declared column set.
///
/// Array columns declare their innermost element type (the store treats
/// every field as repeatable); nested columns declare `nested` and leave
/// sub-fields to dynamic mapping.
#[must_use]
pub fn mapping_for(columns: &ColumnTypeSpec) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, column) in columns {
        properties.insert(name.clone(), mapping_entry(column));
    }
    json!({ "properties": properties })
}

fn mapping_entry(column: &ColumnType) -> Value {
    let target = column.innermost();
    json!({ "type": target.as_str() })
}

/// Diffs a declared column set against the live schema of the target
/// table.
///
/// Returns the additive subset: columns the store does not know yet and
/// must have declared before the first write. Columns the store already
/// holds under a type the declared type can cast into are dropped from
/// the result. A declared type with no legal cast fails the job before
/// any mapping push or data write.
///
/// # Errors
///
/// Returns [`Error::SchemaConflict`] naming the first irreconcilable
/// field.
pub fn reconcile(declared: &ColumnTypeSpec, existing: &ColumnTypeSpec) -> Result<ColumnTypeSpec> {
    let mut additions = ColumnTypeSpec::new();
    for (name, column) in declared {
        let requested = column.innermost();
        match existing.get(name) {
            None => {
                additions.insert(name.clone(), column.clone());
            }
            Some(current) => {
                let stored = current.innermost();
                if !requested.can_cast_to(stored) {
                    return Err(Error::SchemaConflict {
                        field: name.clone(),
                        existing: stored.as_str().to_string(),
                        requested: requested.as_str().to_string(),
                    });
                }
            }
        }
    }
    Ok(additions)
}

/// Convenience wrapper: reconciles and renders the mapping document for
/// the additive fields in one step.
///
/// # Errors
///
/// Propagates [`Error::SchemaConflict`] from [`reconcile`].
pub fn additive_mapping(declared: &ColumnTypeSpec, existing: &ColumnTypeSpec) -> Result<Value> {
    let additions = reconcile(declared, existing)?;
    Ok(mapping_for(&additions))
}

/// Parses a store-native mapping document back into a declared column
/// set. Unknown store types read as `text`.
#[must_use]
pub fn columns_from_mapping(mapping: &Value) -> ColumnTypeSpec {
    let mut columns = ColumnTypeSpec::new();
    let Some(properties) = mapping.get("properties").and_then(Value::as_object) else {
        return columns;
    };
    for (name, entry) in properties {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .and_then(FieldType::parse)
            .unwrap_or(FieldType::Text);
        columns.insert(name.clone(), ColumnType::scalar(kind));
    }
    columns
}
