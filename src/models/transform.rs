//! Declared per-record field transformations.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the ordered transform pipeline.
///
/// Transforms execute strictly in declared order; each reads, writes, or
/// deletes fields of the working record. The crypto variants take no
/// inline arguments: key and salt material comes from deployment
/// configuration, never from persisted templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Moves a value to a new field name.
    Rename {
        /// Source column.
        col: String,
        /// Destination column.
        new_name: String,
    },
    /// Splits a text value on the first occurrence of a separator.
    Split {
        /// Source column (deleted by the split).
        col: String,
        /// The two destination columns.
        new_names: [String; 2],
        /// Separator text; if absent from the value, the second
        /// destination receives an empty string.
        separator: String,
    },
    /// Concatenates two text columns into one.
    Merge {
        /// First source column.
        col: String,
        /// Second source column.
        merge_col: String,
        /// Destination column; sources are deleted unless they share
        /// this name.
        new_name: String,
        /// Text placed between the two values.
        separator: String,
    },
    /// Copies a value to a second field, keeping the source.
    Duplicate {
        /// Source column.
        col: String,
        /// Destination column.
        new_name: String,
    },
    /// Prefixes a text value with fixed text.
    Prepend {
        /// Target column.
        col: String,
        /// Text to prefix.
        text: String,
    },
    /// Suffixes a text value with fixed text.
    Append {
        /// Target column.
        col: String,
        /// Text to suffix.
        text: String,
    },
    /// Encrypts a text value with the deployment cipher key.
    Encrypt {
        /// Target column.
        col: String,
    },
    /// Decrypts a value produced by `encrypt`.
    Decrypt {
        /// Target column.
        col: String,
    },
    /// One-way two-stage hash of a text value.
    Hash {
        /// Target column.
        col: String,
    },
}

impl Transform {
    /// Returns the operation name.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::Split { .. } => "split",
            Self::Merge { .. } => "merge",
            Self::Duplicate { .. } => "duplicate",
            Self::Prepend { .. } => "prepend",
            Self::Append { .. } => "append",
            Self::Encrypt { .. } => "encrypt",
            Self::Decrypt { .. } => "decrypt",
            Self::Hash { .. } => "hash",
        }
    }

    /// Returns the primary source column.
    #[must_use]
    pub fn col(&self) -> &str {
        match self {
            Self::Rename { col, .. }
            | Self::Split { col, .. }
            | Self::Merge { col, .. }
            | Self::Duplicate { col, .. }
            | Self::Prepend { col, .. }
            | Self::Append { col, .. }
            | Self::Encrypt { col }
            | Self::Decrypt { col }
            | Self::Hash { col } => col,
        }
    }

    /// Validates argument shape.
    ///
    /// A failure here is a fatal configuration error: malformed
    /// transforms never reach per-record execution.
    pub fn validate(&self) -> Result<()> {
        let required = |value: &str, what: &str| {
            if value.is_empty() {
                Err(Error::InvalidInput(format!(
                    "{} transform requires a non-empty {what}",
                    self.op()
                )))
            } else {
                Ok(())
            }
        };
        required(self.col(), "source column")?;
        match self {
            Self::Rename { new_name, .. } | Self::Duplicate { new_name, .. } => {
                required(new_name, "destination column")
            }
            Self::Split { new_names, .. } => {
                required(&new_names[0], "destination column")?;
                required(&new_names[1], "destination column")
            }
            Self::Merge {
                merge_col,
                new_name,
                ..
            } => {
                required(merge_col, "merge column")?;
                required(new_name, "destination column")
            }
            Self::Prepend { .. }
            | Self::Append { .. }
            | Self::Encrypt { .. }
            | Self::Decrypt { .. }
            | Self::Hash { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op(), self.col())
    }
}
