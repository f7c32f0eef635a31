//! Record validation against a declared column set.
//!
//! Sits between chunk decode and staging: every record is projected to
//! the declared columns, type-checked, and normalized in place. CSV
//! records arrive as strings and are coerced cell by cell; JSON records
//! arrive typed and are checked structurally.
//!
//! The JSON path is hash-accelerated: a record whose structural shape
//! matches the declared columns exactly skips the per-field walk, and
//! shapes that survive the walk once (numeric strings, padded nulls)
//! are remembered in a small LRU so the next record of the same shape
//! passes without re-walking.

use crate::models::{ColumnType, ColumnTypeSpec, Document, FieldType, FileKind};
use crate::schema::infer::{
    coarse_type, is_null_literal, is_type_consistent, looks_like_date, normalize_date, parse_number,
};
use crate::{Error, Result};
use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Structural fingerprints remembered per validator.
const SHAPE_CACHE_SIZE: usize = 256;

type ShapeHash = [u8; 32];

/// Validates decoded records against a template's declared columns.
///
/// Shared by the validator workers of one import job; all methods take
/// `&self` and mutate only the record handed in (plus the internal
/// shape cache behind a mutex).
pub struct RecordValidator {
    columns: ColumnTypeSpec,
    primary_keys: Vec<String>,
    require_all_fields: bool,
    declared_shape: ShapeHash,
    approved_shapes: Mutex<LruCache<ShapeHash, ()>>,
}

impl RecordValidator {
    /// Creates a validator for the given column contract.
    #[must_use]
    pub fn new(columns: ColumnTypeSpec, primary_keys: Vec<String>) -> Self {
        let declared_shape = declared_shape_hash(&columns);
        let capacity = NonZeroUsize::new(SHAPE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            columns,
            primary_keys,
            require_all_fields: true,
            declared_shape,
            approved_shapes: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Sets whether JSON records must carry every declared column.
    ///
    /// When `false`, missing columns are padded with null instead of
    /// rejecting the record.
    #[must_use]
    pub const fn with_require_all_fields(mut self, require: bool) -> Self {
        self.require_all_fields = require;
        self
    }

    /// Validates and normalizes one record in place.
    ///
    /// `index` is the record's position in the input, used in the
    /// rejection message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordRejected`] naming the first offending
    /// field.
    pub fn validate(&self, index: usize, record: &mut Document, kind: FileKind) -> Result<()> {
        // Presence is only enforceable for JSON; CSV rows are positional
        // and a column absent from the source header is padded instead.
        let enforce_presence = self.require_all_fields && kind == FileKind::Json;
        self.project(index, record, enforce_presence)?;
        match kind {
            FileKind::Csv => self.coerce_csv(index, record)?,
            FileKind::Json => {
                self.normalize_values(record);
                self.check_json(index, record)?;
            }
        }
        self.check_primary_keys(index, record)?;
        Ok(())
    }

    /// Restricts the record to the declared columns: undeclared keys
    /// are dropped silently, missing keys are padded or rejected.
    fn project(&self, index: usize, record: &mut Document, enforce_presence: bool) -> Result<()> {
        record.retain(|key, _| self.columns.contains_key(key));
        for name in self.columns.keys() {
            if !record.contains_key(name) {
                if enforce_presence {
                    return Err(reject(
                        index,
                        format!("record is missing declared column '{name}'"),
                    ));
                }
                record.insert(name.clone(), Value::Null);
            }
        }
        Ok(())
    }

    /// Rewrites date-typed values (and date array elements) to the
    /// stored `YYYY-MM-DD` form, and escapes literal line breaks in
    /// text-typed values. Values that do not parse are left for the
    /// type check to reject.
    fn normalize_values(&self, record: &mut Document) {
        for (name, column) in &self.columns {
            let Some(value) = record.get_mut(name) else {
                continue;
            };
            match column.innermost() {
                FieldType::Date => normalize_date_value(value),
                FieldType::Text => escape_newlines_value(value),
                _ => {}
            }
        }
    }

    fn check_json(&self, index: usize, record: &Document) -> Result<()> {
        self.check_arrays(index, record)?;
        let shape = record_shape_hash(record);
        if shape == self.declared_shape || self.shape_approved(&shape) {
            return Ok(());
        }
        self.check_fields(index, record)?;
        self.remember_shape(&shape);
        Ok(())
    }

    /// Element consistency for declared array columns. Runs on every
    /// record; the shape fast path only sees first elements.
    fn check_arrays(&self, index: usize, record: &Document) -> Result<()> {
        for (name, column) in &self.columns {
            if column.kind != FieldType::Array {
                continue;
            }
            if let Some(Value::Array(items)) = record.get(name)
                && !is_type_consistent(items)
            {
                return Err(reject(
                    index,
                    format!("array in field '{name}' contains inconsistent element types"),
                ));
            }
        }
        Ok(())
    }

    /// Full per-field walk for records whose shape does not match the
    /// declared columns exactly.
    fn check_fields(&self, index: usize, record: &Document) -> Result<()> {
        if record.len() != self.columns.len() {
            for key in self.columns.keys() {
                if !record.contains_key(key) {
                    return Err(reject(
                        index,
                        format!("record is missing declared column '{key}'"),
                    ));
                }
            }
            for key in record.keys() {
                if !self.columns.contains_key(key) {
                    return Err(reject(
                        index,
                        format!("record carries undeclared column '{key}'"),
                    ));
                }
            }
        }
        for (name, column) in &self.columns {
            let value = record.get(name).unwrap_or(&Value::Null);
            check_value(index, name, column, value)?;
        }
        Ok(())
    }

    /// Coerces typed values out of CSV string cells, in place.
    fn coerce_csv(&self, index: usize, record: &mut Document) -> Result<()> {
        for (name, column) in &self.columns {
            let Some(current) = record.get(name) else {
                continue;
            };
            let Value::String(raw) = current else {
                // Padded nulls and already-typed values pass through.
                continue;
            };
            let coerced = if is_null_literal(raw) {
                Value::Null
            } else {
                coerce_cell(index, name, column, raw)?
            };
            record.insert(name.clone(), coerced);
        }
        Ok(())
    }

    fn check_primary_keys(&self, index: usize, record: &Document) -> Result<()> {
        for key in &self.primary_keys {
            let present = match record.get(key) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(reject(
                    index,
                    format!("primary key '{key}' is empty or missing"),
                ));
            }
        }
        Ok(())
    }

    fn shape_approved(&self, shape: &ShapeHash) -> bool {
        self.approved_shapes
            .lock()
            .map_or(false, |mut cache| cache.get(shape).is_some())
    }

    fn remember_shape(&self, shape: &ShapeHash) {
        if let Ok(mut cache) = self.approved_shapes.lock() {
            cache.put(*shape, ());
        }
    }
}

/// Decodes one CSV chunk into raw string records keyed by the declared
/// input column order.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for rows whose column count does not
/// match, quoting the offending row.
pub fn decode_csv_chunk(payload: &str, original_names: &[String]) -> Result<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(payload.as_bytes());
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| Error::InvalidInput(format!("malformed CSV row: {err}")))?;
        if row.len() != original_names.len() {
            return Err(Error::InvalidInput(format!(
                "CSV row has {} columns, expected {}: {}",
                row.len(),
                original_names.len(),
                row.iter().collect::<Vec<_>>().join(",")
            )));
        }
        let mut record = Document::new();
        for (name, cell) in original_names.iter().zip(row.iter()) {
            record.insert(name.clone(), Value::String(cell.to_string()));
        }
        records.push(record);
    }
    Ok(records)
}

/// Decodes one bracket-wrapped JSON chunk into records.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the chunk is not an array of
/// objects.
pub fn decode_json_chunk(payload: &str) -> Result<Vec<Document>> {
    serde_json::from_str::<Vec<Document>>(payload).map_err(|err| {
        Error::InvalidInput(format!("chunk does not parse as a JSON array of objects: {err}"))
    })
}

/// Decodes one newline-separated JSON chunk into records, one object
/// per non-empty line.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] quoting the offending line.
pub fn decode_ndjson_chunk(payload: &str) -> Result<Vec<Document>> {
    let mut records = Vec::new();
    for line in payload.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Document = serde_json::from_str(trimmed).map_err(|err| {
            Error::InvalidInput(format!("line does not parse as a JSON object: {err}: {trimmed}"))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn reject(record: usize, cause: impl Into<String>) -> Error {
    Error::RecordRejected {
        record,
        cause: cause.into(),
    }
}

/// Checks one typed value against its declared column, recursing into
/// the first element of arrays. Nulls pass every type.
fn check_value(index: usize, field: &str, column: &ColumnType, value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let ok = match column.kind {
        FieldType::Nested => value.is_object(),
        FieldType::Array => {
            let Value::Array(items) = value else {
                return Err(type_mismatch(index, field, column, value));
            };
            if let (Some(first), Some(element)) = (items.first(), column.element()) {
                check_value(index, field, element, first)?;
            }
            true
        }
        FieldType::Boolean => value.is_boolean(),
        FieldType::Date => value
            .as_str()
            .is_some_and(looks_like_date),
        FieldType::Text => value.is_string(),
        // Store-side composite; any of the accepted shapes passes.
        FieldType::GeoPoint => value.is_array() || value.is_string() || value.is_object(),
        kind if kind.is_numeric() => {
            value.is_number()
                || value.as_str().is_some_and(|s| {
                    serde_json::from_str::<Value>(s).is_ok_and(|v| v.is_number())
                })
        }
        _ => value.is_string(),
    };
    if ok {
        Ok(())
    } else {
        Err(type_mismatch(index, field, column, value))
    }
}

fn type_mismatch(index: usize, field: &str, column: &ColumnType, value: &Value) -> Error {
    reject(
        index,
        format!(
            "field '{field}' expected {column} but found {}",
            coarse_type(value).as_str()
        ),
    )
}

/// Coerces one non-null CSV cell to its declared type.
fn coerce_cell(index: usize, field: &str, column: &ColumnType, raw: &str) -> Result<Value> {
    let mismatch = || {
        reject(
            index,
            format!("field '{field}' expected {column} but found '{raw}'"),
        )
    };
    match column.kind {
        FieldType::Boolean => match raw.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        FieldType::Date => normalize_date(raw)
            .map(Value::String)
            .ok_or_else(mismatch),
        FieldType::Text => Ok(Value::String(escape_newlines(raw))),
        FieldType::GeoPoint => Ok(Value::String(raw.to_string())),
        FieldType::Array => {
            let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) else {
                return Err(mismatch());
            };
            if !is_type_consistent(&items) {
                return Err(reject(
                    index,
                    format!("array in field '{field}' contains inconsistent element types"),
                ));
            }
            let mut value = Value::Array(items);
            match column.innermost() {
                FieldType::Date => normalize_date_value(&mut value),
                FieldType::Text => escape_newlines_value(&mut value),
                _ => {}
            }
            if let (Value::Array(items), Some(element)) = (&value, column.element())
                && let Some(first) = items.first()
            {
                check_value(index, field, element, first)?;
            }
            Ok(value)
        }
        FieldType::Nested => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(mismatch()),
        },
        kind if kind.is_numeric() => {
            let number = parse_number(raw).ok_or_else(mismatch)?;
            if kind.is_integral() {
                integral_value(number).ok_or_else(mismatch)
            } else {
                serde_json::Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(mismatch)
            }
        }
        _ => Ok(Value::String(raw.to_string())),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_value(number: f64) -> Option<Value> {
    if number.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&number) {
        Some(Value::from(number as i64))
    } else {
        None
    }
}

/// Rewrites date-shaped strings (scalar or array elements) to the
/// normalized stored form.
fn normalize_date_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(normalized) = normalize_date(s) {
                *s = normalized;
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_date_value(item);
            }
        }
        _ => {}
    }
}

/// Escapes literal line breaks so text values stay single-line in the
/// store and in line-oriented output.
fn escape_newlines(raw: &str) -> String {
    raw.replace('\n', "\\n").replace('\r', "\\r")
}

/// Applies [`escape_newlines`] to a text value, scalar or array
/// elements.
fn escape_newlines_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains(['\n', '\r']) {
                *s = escape_newlines(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                escape_newlines_value(item);
            }
        }
        _ => {}
    }
}

/// Coarse structural label of a value: numerics unify to one label,
/// arrays are labeled by their first element.
fn value_shape(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) => out.push_str("boolean"),
        Value::Number(_) => out.push_str("number"),
        Value::String(_) => out.push_str("text"),
        Value::Object(_) => out.push_str("nested"),
        Value::Array(items) => {
            out.push_str("array<");
            match items.first() {
                Some(first) => value_shape(first, out),
                None => out.push('*'),
            }
            out.push('>');
        }
    }
}

/// The shape a conforming value of this column renders as.
fn column_shape(column: &ColumnType, out: &mut String) {
    match column.kind {
        FieldType::Array => {
            out.push_str("array<");
            match column.element() {
                Some(element) => column_shape(element, out),
                None => out.push('*'),
            }
            out.push('>');
        }
        FieldType::Nested => out.push_str("nested"),
        FieldType::Boolean => out.push_str("boolean"),
        // Geo points never shape-match; they always take the slow path.
        FieldType::GeoPoint => out.push_str("geo_point"),
        kind if kind.is_numeric() => out.push_str("number"),
        // Dates are stored as strings and hash like text.
        _ => out.push_str("text"),
    }
}

fn record_shape_hash(record: &Document) -> ShapeHash {
    let mut hasher = Sha256::new();
    let mut shape = String::new();
    for (key, value) in record {
        shape.clear();
        value_shape(value, &mut shape);
        hash_entry(&mut hasher, key, &shape);
    }
    hasher.finalize().into()
}

fn declared_shape_hash(columns: &ColumnTypeSpec) -> ShapeHash {
    let mut hasher = Sha256::new();
    let mut shape = String::new();
    for (key, column) in columns {
        shape.clear();
        column_shape(column, &mut shape);
        hash_entry(&mut hasher, key, &shape);
    }
    hasher.finalize().into()
}

fn hash_entry(hasher: &mut Sha256, key: &str, shape: &str) {
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(shape.as_bytes());
    hasher.update([0xff]);
}
