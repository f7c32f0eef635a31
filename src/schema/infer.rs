//! Type inference over raw CSV strings and JSON values.
//!
//! Classifies untyped incoming data into the closed lattice
//! `{null, boolean, long, double, date, text, array<T>, nested}` and
//! resolves multiple per-field observations into a single priority type.
//! Everything here is a pure function over its inputs; the engine is used
//! both to build suggested column types at template-creation time and to
//! support per-record validation.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::models::{ColumnType, ColumnTypeSpec, FieldType};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static MM_DD_YYYY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0?[1-9]|1[0-2])/(0?[1-9]|[12][0-9]|3[01])/[0-9]{4}$")
        .expect("static regex: MM/DD/YYYY")
});

// Deliberately unanchored: a timestamp-bearing substring still marks the
// value as date-like.
static YYYY_MM_DD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{4}-[01][0-9]-[0-3][0-9]").expect("static regex: YYYY-MM-DD"));

static ISO_8601_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[0-9]{4}-[01][0-9]-[0-3][0-9]( |T)?[0-2][0-9]:?[0-5][0-9]:?[0-9]{2}(\.[0-9]{3,6}|[-+]?[0-9]{2}:[0-9]{2})?Z?$",
    )
    .expect("static regex: ISO-8601")
});

/// A type observation for one raw value.
///
/// Unlike [`FieldType`], observations include `Null` (a value that tells
/// us nothing) and carry the recursive element type for arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Inferred {
    /// Empty or literal-null value.
    Null,
    /// `true` / `false`.
    Boolean,
    /// Integral numeric literal.
    Long,
    /// Fractional numeric literal.
    Double,
    /// Date-shaped value.
    Date,
    /// Anything else.
    Text,
    /// Embedded object.
    Nested,
    /// Homogeneous list of the inner observation.
    Array(Box<Inferred>),
}

impl Inferred {
    /// Converts an observation into a declared column descriptor.
    ///
    /// `Null` becomes `text` (no data means no evidence, and text admits
    /// everything); suggested `nested` columns carry a text placeholder
    /// element until the caller refines them.
    #[must_use]
    pub fn to_column_type(&self) -> ColumnType {
        match self {
            Self::Null | Self::Text => ColumnType::scalar(FieldType::Text),
            Self::Boolean => ColumnType::scalar(FieldType::Boolean),
            Self::Long => ColumnType::scalar(FieldType::Long),
            Self::Double => ColumnType::scalar(FieldType::Double),
            Self::Date => ColumnType::scalar(FieldType::Date),
            Self::Nested => ColumnType::nested_of(ColumnType::scalar(FieldType::Text)),
            Self::Array(inner) => ColumnType::array_of(inner.to_column_type()),
        }
    }
}

/// Coarse value categories used for structural comparison.
///
/// Numeric widths are deliberately unified: a structural fingerprint must
/// not distinguish `1` from `1.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coarse {
    /// JSON null.
    Null,
    /// JSON boolean.
    Boolean,
    /// Any JSON number.
    Number,
    /// JSON string.
    Text,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl Coarse {
    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Text => "text",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Returns the coarse category of a JSON value.
#[must_use]
pub const fn coarse_type(value: &Value) -> Coarse {
    match value {
        Value::Null => Coarse::Null,
        Value::Bool(_) => Coarse::Boolean,
        Value::Number(_) => Coarse::Number,
        Value::String(_) => Coarse::Text,
        Value::Array(_) => Coarse::Array,
        Value::Object(_) => Coarse::Object,
    }
}

/// Parses a numeric literal, accepting comma-grouped, `$`-prefixed, and
/// `%`-suffixed forms (`%` divides by 100). Returns `None` for anything
/// non-finite or non-numeric.
#[must_use]
pub fn parse_number(value: &str) -> Option<f64> {
    if let Some(n) = plain_number(value) {
        return Some(n);
    }
    if let Some(rest) = value.strip_prefix('$')
        && let Some(n) = plain_number(rest)
    {
        return Some(n);
    }
    if let Some(rest) = value.strip_suffix('%')
        && let Some(n) = plain_number(rest)
    {
        return Some(n / 100.0);
    }
    None
}

fn plain_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    degroup(trimmed)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

// Strips comma grouping, requiring strict groups of three: "1,105.20"
// degroups, "11,05" does not.
fn degroup(value: &str) -> Option<String> {
    let mut out = value.as_bytes().to_vec();
    let decimal = value.find('.').unwrap_or(out.len());
    let mut ind = isize::try_from(decimal).ok()? - 4;
    let mut removed_any = false;
    while ind > 0 {
        #[allow(clippy::cast_sign_loss)]
        let at = ind as usize;
        if out[at] == b',' {
            out.remove(at);
            removed_any = true;
            ind -= 4;
        } else {
            return None;
        }
    }
    if !removed_any {
        return None;
    }
    String::from_utf8(out).ok()
}

/// Returns true if the value matches one of the recognized date shapes
/// (`MM/DD/YYYY`, `YYYY-MM-DD`, or ISO-8601 timestamps).
#[must_use]
pub fn looks_like_date(value: &str) -> bool {
    MM_DD_YYYY_RE.is_match(value)
        || YYYY_MM_DD_RE.is_match(value)
        || ISO_8601_RE.is_match(value)
}

/// Normalizes a date value for storage.
///
/// `MM/DD/YYYY` values are rearranged to `YYYY-MM-DD` after a calendar
/// check; already-ISO values pass through unchanged. Returns `None` when
/// the value is not date-shaped (or names an impossible calendar day).
#[must_use]
pub fn normalize_date(value: &str) -> Option<String> {
    if MM_DD_YYYY_RE.is_match(value) {
        let mut parts = value.splitn(3, '/');
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        let year: i32 = parts.next()?.parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if YYYY_MM_DD_RE.is_match(value) || ISO_8601_RE.is_match(value) {
        return Some(value.to_string());
    }
    None
}

/// Classifies one raw CSV cell.
///
/// The ladder runs null → boolean → array → long → double → date → text;
/// the first match wins. Array cells are JSON literals and recurse on
/// their first element; mixed-type arrays degrade to `text`.
#[must_use]
pub fn infer_csv(value: &str) -> Inferred {
    if is_null_literal(value) {
        return Inferred::Null;
    }
    match value.trim() {
        "true" | "false" => return Inferred::Boolean,
        _ => {}
    }
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(value) {
        if items.is_empty() {
            return Inferred::Array(Box::new(Inferred::Null));
        }
        if !is_type_consistent(&items) {
            return Inferred::Text;
        }
        return Inferred::Array(Box::new(infer_element(&items[0])));
    }
    if parse_number(value).is_some() {
        if value.contains('.') {
            return Inferred::Double;
        }
        return Inferred::Long;
    }
    if looks_like_date(value) {
        return Inferred::Date;
    }
    Inferred::Text
}

/// Returns true for the literals the engine reads as "no value".
#[must_use]
pub fn is_null_literal(value: &str) -> bool {
    value.is_empty() || value == "null" || value == "undefined"
}

// Element classification inside a CSV array literal. Strings stay text
// (their quotes already consumed by the JSON parse); objects have no
// lattice home in CSV cells and degrade to text.
fn infer_element(value: &Value) -> Inferred {
    match value {
        Value::Null => Inferred::Null,
        Value::Bool(_) => Inferred::Boolean,
        Value::Number(n) => {
            if is_integral(n) {
                Inferred::Long
            } else {
                Inferred::Double
            }
        }
        Value::String(_) | Value::Object(_) => Inferred::Text,
        Value::Array(items) => {
            if items.is_empty() {
                return Inferred::Array(Box::new(Inferred::Null));
            }
            if !is_type_consistent(items) {
                return Inferred::Text;
            }
            Inferred::Array(Box::new(infer_element(&items[0])))
        }
    }
}

/// Classifies one JSON document value.
///
/// Strings are date-checked; numbers split integral/fractional; objects
/// are nested; arrays recurse on their first element and degrade to
/// `text` when elements disagree.
#[must_use]
pub fn infer_value(value: &Value) -> Inferred {
    match value {
        Value::Null => Inferred::Null,
        Value::Bool(_) => Inferred::Boolean,
        Value::Number(n) => {
            if is_integral(n) {
                Inferred::Long
            } else {
                Inferred::Double
            }
        }
        Value::String(s) => {
            if looks_like_date(s) {
                Inferred::Date
            } else {
                Inferred::Text
            }
        }
        Value::Object(_) => Inferred::Nested,
        Value::Array(items) => {
            if items.is_empty() {
                return Inferred::Array(Box::new(Inferred::Null));
            }
            if !is_type_consistent(items) {
                return Inferred::Text;
            }
            Inferred::Array(Box::new(infer_value(&items[0])))
        }
    }
}

fn is_integral(n: &serde_json::Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// Checks that every element of an array (recursively for arrays of
/// arrays) shares one coarse type. Nulls are compatible with anything.
#[must_use]
pub fn is_type_consistent(values: &[Value]) -> bool {
    level_type(values).is_some()
}

// Returns the single coarse type label for a level, "null" for an empty
// level, or None when the level mixes types.
fn level_type(values: &[Value]) -> Option<&'static str> {
    if values.is_empty() {
        return Some("null");
    }
    let mut seen: Vec<&'static str> = Vec::new();
    for value in values {
        let label = coarse_type(value).as_str();
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    if seen.len() > 1 {
        seen.retain(|label| *label != "null");
    }
    if seen.len() != 1 {
        return None;
    }
    if seen[0] != "array" {
        return Some(seen[0]);
    }
    let mut inner: Vec<&'static str> = Vec::new();
    for value in values {
        let label = match value {
            Value::Array(items) => level_type(items)?,
            // Nulls survived the retain above; they are vacuous here.
            Value::Null => "null",
            _ => return None,
        };
        if !inner.contains(&label) {
            inner.push(label);
        }
    }
    if inner.len() > 1 {
        inner.retain(|label| *label != "null");
    }
    if inner.len() != 1 {
        return None;
    }
    Some(inner[0])
}

/// Resolves multiple observations of one field into its priority type.
///
/// Nulls are discarded; an empty set of evidence resolves to `text`.
/// Array observations must be unanimous (a mix of array and non-array
/// samples has no common supertype short of `text`) and resolve
/// element-wise. Nested beats scalars; `{long, double}` widens to
/// `double`; any other disagreement lands on `text`.
#[must_use]
pub fn best_type<I>(samples: I) -> Inferred
where
    I: IntoIterator<Item = Inferred>,
{
    let mut distinct: Vec<Inferred> = Vec::new();
    for sample in samples {
        if !distinct.contains(&sample) {
            distinct.push(sample);
        }
    }
    resolve(distinct).unwrap_or(Inferred::Text)
}

// None marks a level that cannot be reconciled; the caller one level up
// turns that into text.
fn resolve(mut distinct: Vec<Inferred>) -> Option<Inferred> {
    distinct.retain(|t| *t != Inferred::Null);
    if distinct.is_empty() {
        return Some(Inferred::Text);
    }
    let array_count = distinct
        .iter()
        .filter(|t| matches!(t, Inferred::Array(_)))
        .count();
    if array_count > 0 {
        if array_count != distinct.len() {
            return None;
        }
        let mut inners: Vec<Inferred> = Vec::new();
        for sample in distinct {
            if let Inferred::Array(inner) = sample {
                let inner = *inner;
                if !inners.contains(&inner) {
                    inners.push(inner);
                }
            }
        }
        return Some(match resolve(inners) {
            Some(element) => Inferred::Array(Box::new(element)),
            None => Inferred::Text,
        });
    }
    if distinct.contains(&Inferred::Nested) {
        return Some(Inferred::Nested);
    }
    if distinct.len() == 1 {
        return distinct.pop();
    }
    if distinct.len() == 2
        && distinct.contains(&Inferred::Long)
        && distinct.contains(&Inferred::Double)
    {
        return Some(Inferred::Double);
    }
    Some(Inferred::Text)
}

/// Suggests declared column types from a sample of CSV rows.
///
/// `names` gives the column order; short rows contribute nulls for their
/// missing cells.
#[must_use]
pub fn suggest_csv_columns(names: &[String], rows: &[Vec<String>]) -> ColumnTypeSpec {
    let mut spec = ColumnTypeSpec::new();
    for (index, name) in names.iter().enumerate() {
        let observations = rows
            .iter()
            .map(|row| row.get(index).map_or(Inferred::Null, |cell| infer_csv(cell)));
        spec.insert(name.clone(), best_type(observations).to_column_type());
    }
    spec
}

/// Suggests declared column types from a sample of JSON documents.
///
/// The suggestion covers the union of keys across the sample; documents
/// missing a key contribute a null observation for it.
#[must_use]
pub fn suggest_json_columns(docs: &[Map<String, Value>]) -> ColumnTypeSpec {
    let mut names: Vec<&String> = Vec::new();
    for doc in docs {
        for key in doc.keys() {
            if !names.contains(&key) {
                names.push(key);
            }
        }
    }
    let mut spec = ColumnTypeSpec::new();
    for name in names {
        let observations = docs
            .iter()
            .map(|doc| doc.get(name).map_or(Inferred::Null, infer_value));
        spec.insert(name.clone(), best_type(observations).to_column_type());
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("", Inferred::Null; "empty string")]
    #[test_case("null", Inferred::Null; "null literal")]
    #[test_case("true", Inferred::Boolean; "boolean true")]
    #[test_case("false", Inferred::Boolean; "boolean false")]
    #[test_case("42", Inferred::Long; "plain integer")]
    #[test_case("-17", Inferred::Long; "negative integer")]
    #[test_case("$1,234", Inferred::Long; "grouped dollars")]
    #[test_case("3.25", Inferred::Double; "plain double")]
    #[test_case("1,105.20", Inferred::Double; "grouped double")]
    #[test_case("12/25/1995", Inferred::Date; "slash date")]
    #[test_case("2020-06-01", Inferred::Date; "dash date")]
    #[test_case("2020-06-01T12:30:45Z", Inferred::Date; "iso timestamp")]
    #[test_case("hello", Inferred::Text; "word")]
    #[test_case("12a", Inferred::Text; "digits then letters")]
    fn test_infer_csv_scalars(value: &str, expected: Inferred) {
        assert_eq!(infer_csv(value), expected);
    }

    #[test]
    fn test_infer_csv_arrays() {
        assert_eq!(
            infer_csv("[1, 2, 3]"),
            Inferred::Array(Box::new(Inferred::Long))
        );
        assert_eq!(
            infer_csv("[[1], [2]]"),
            Inferred::Array(Box::new(Inferred::Array(Box::new(Inferred::Long))))
        );
        assert_eq!(
            infer_csv("[]"),
            Inferred::Array(Box::new(Inferred::Null))
        );
        // Heterogeneous arrays carry no single element type.
        assert_eq!(infer_csv(r#"[1, "a"]"#), Inferred::Text);
    }

    #[test_case("1,105.20", Some(1105.20); "comma grouped")]
    #[test_case("$250", Some(250.0); "dollar prefix")]
    #[test_case("$1,500.75", Some(1500.75); "dollar grouped")]
    #[test_case("45%", Some(0.45); "percent suffix")]
    #[test_case("1e3", Some(1000.0); "exponent form")]
    #[test_case("11,05", None; "bad grouping")]
    #[test_case("abc", None; "letters")]
    #[test_case("NaN", None; "nan is rejected")]
    #[test_case("", None; "empty")]
    fn test_parse_number(value: &str, expected: Option<f64>) {
        match (parse_number(value), expected) {
            (Some(a), Some(b)) => assert!((a - b).abs() < f64::EPSILON),
            (None, None) => {}
            (actual, wanted) => panic!("parse_number({value:?}) = {actual:?}, wanted {wanted:?}"),
        }
    }

    #[test]
    fn test_normalize_date_rearranges_slash_form() {
        assert_eq!(
            normalize_date("12/25/1995").as_deref(),
            Some("1995-12-25")
        );
        assert_eq!(normalize_date("1/2/2020").as_deref(), Some("2020-01-02"));
        // Impossible calendar days are rejected even when regex-shaped.
        assert_eq!(normalize_date("2/30/2020"), None);
        // ISO forms pass through untouched.
        assert_eq!(
            normalize_date("2020-06-01T12:30:45Z").as_deref(),
            Some("2020-06-01T12:30:45Z")
        );
        assert_eq!(normalize_date("yesterday"), None);
    }

    #[test]
    fn test_infer_value_json() {
        assert_eq!(infer_value(&json!(null)), Inferred::Null);
        assert_eq!(infer_value(&json!(12)), Inferred::Long);
        assert_eq!(infer_value(&json!(12.000)), Inferred::Long);
        assert_eq!(infer_value(&json!(12.5)), Inferred::Double);
        assert_eq!(infer_value(&json!("2020-06-01")), Inferred::Date);
        assert_eq!(infer_value(&json!("plain")), Inferred::Text);
        assert_eq!(infer_value(&json!({"a": 1})), Inferred::Nested);
        assert_eq!(
            infer_value(&json!([true, false])),
            Inferred::Array(Box::new(Inferred::Boolean))
        );
        assert_eq!(infer_value(&json!([1, "a"])), Inferred::Text);
    }

    #[test]
    fn test_consistency_ignores_nulls() {
        let ok = vec![json!(1), json!(null), json!(2)];
        assert!(is_type_consistent(&ok));

        let mixed = vec![json!(1), json!("a")];
        assert!(!is_type_consistent(&mixed));

        let nested_ok = vec![json!([1, 2]), json!([]), json!([3])];
        assert!(is_type_consistent(&nested_ok));

        let nested_mixed = vec![json!([1]), json!(["a"])];
        assert!(!is_type_consistent(&nested_mixed));
    }

    #[test]
    fn test_best_type_numeric_widening() {
        assert_eq!(
            best_type([Inferred::Long, Inferred::Double, Inferred::Null]),
            Inferred::Double
        );
        assert_eq!(best_type([Inferred::Long, Inferred::Long]), Inferred::Long);
    }

    #[test]
    fn test_best_type_empty_evidence_is_text() {
        assert_eq!(best_type([]), Inferred::Text);
        assert_eq!(best_type([Inferred::Null]), Inferred::Text);
    }

    #[test]
    fn test_best_type_array_branches() {
        let long_arr = || Inferred::Array(Box::new(Inferred::Long));
        let double_arr = || Inferred::Array(Box::new(Inferred::Double));

        // Element-wise widening.
        assert_eq!(best_type([long_arr(), double_arr()]), double_arr());
        // Arrays mixed with scalars have no common supertype short of text.
        assert_eq!(best_type([long_arr(), Inferred::Long]), Inferred::Text);
        // Nested depth disagreement collapses the whole field to text.
        let deep = Inferred::Array(Box::new(long_arr()));
        assert_eq!(best_type([deep, long_arr()]), Inferred::Text);
        // Empty-array evidence defers to the populated samples.
        let null_arr = Inferred::Array(Box::new(Inferred::Null));
        assert_eq!(best_type([null_arr, long_arr()]), long_arr());
    }

    #[test]
    fn test_best_type_nested_beats_scalars() {
        assert_eq!(
            best_type([Inferred::Nested, Inferred::Long]),
            Inferred::Nested
        );
        assert_eq!(
            best_type([Inferred::Boolean, Inferred::Date]),
            Inferred::Text
        );
    }

    #[test]
    fn test_suggest_csv_columns() {
        let names = vec!["id".to_string(), "price".to_string(), "note".to_string()];
        let rows = vec![
            vec!["1".to_string(), "4.50".to_string(), String::new()],
            vec!["2".to_string(), "5".to_string(), "ok".to_string()],
        ];
        let spec = suggest_csv_columns(&names, &rows);
        assert_eq!(spec["id"], ColumnType::scalar(FieldType::Long));
        assert_eq!(spec["price"], ColumnType::scalar(FieldType::Double));
        assert_eq!(spec["note"], ColumnType::scalar(FieldType::Text));
    }

    #[test]
    fn test_suggest_json_columns_union_of_keys() {
        let docs = vec![
            json!({"id": 1, "tags": ["a"]}),
            json!({"id": 2, "extra": true}),
        ];
        let docs: Vec<Map<String, Value>> = docs
            .into_iter()
            .map(|d| d.as_object().cloned().unwrap())
            .collect();
        let spec = suggest_json_columns(&docs);
        assert_eq!(spec["id"], ColumnType::scalar(FieldType::Long));
        assert_eq!(
            spec["tags"],
            ColumnType::array_of(ColumnType::scalar(FieldType::Text))
        );
        assert_eq!(spec["extra"], ColumnType::scalar(FieldType::Boolean));
    }
}
