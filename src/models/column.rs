//! Declared column-type descriptors.

use super::FieldType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared field-name → type contract for one table.
///
/// Iteration (and therefore export column order) follows key order.
pub type ColumnTypeSpec = BTreeMap<String, ColumnType>;

/// Recursive type descriptor for one declared column.
///
/// `inner` is present iff the kind is compound (`array` or `nested`):
/// `array` descriptors name their element type, `nested` descriptors name
/// the type their sub-documents are validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    /// The declared type.
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Element/sub-document descriptor for compound kinds.
    #[serde(rename = "innerType", default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<ColumnType>>,
}

impl ColumnType {
    /// Creates a scalar descriptor.
    #[must_use]
    pub const fn scalar(kind: FieldType) -> Self {
        Self { kind, inner: None }
    }

    /// Creates an array descriptor over the given element type.
    #[must_use]
    pub fn array_of(inner: Self) -> Self {
        Self {
            kind: FieldType::Array,
            inner: Some(Box::new(inner)),
        }
    }

    /// Creates a nested descriptor over the given sub-document type.
    #[must_use]
    pub fn nested_of(inner: Self) -> Self {
        Self {
            kind: FieldType::Nested,
            inner: Some(Box::new(inner)),
        }
    }

    /// Returns the element descriptor of a compound column.
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        self.inner.as_deref()
    }

    /// Unwraps arrays to the innermost non-array type.
    ///
    /// This is the type the store mapping uses: the store represents a
    /// list of longs as a `long` field that happens to hold many values.
    #[must_use]
    pub fn innermost(&self) -> FieldType {
        let mut current = self;
        while current.kind == FieldType::Array {
            match current.inner.as_deref() {
                Some(inner) => current = inner,
                None => return FieldType::Text,
            }
        }
        current.kind
    }

    /// Checks the compound/inner invariant recursively.
    pub fn validate(&self, column: &str) -> Result<()> {
        match (self.kind.is_compound(), self.inner.as_deref()) {
            (true, Some(inner)) => inner.validate(column),
            (true, None) => Err(Error::InvalidInput(format!(
                "column '{column}': {} type requires an inner type",
                self.kind
            ))),
            (false, Some(_)) => Err(Error::InvalidInput(format!(
                "column '{column}': scalar type {} may not carry an inner type",
                self.kind
            ))),
            (false, None) => Ok(()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.as_deref() {
            Some(inner) => write!(f, "{}<{inner}>", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
