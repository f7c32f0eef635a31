//! The closed column-type lattice and its cast-compatibility table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar and compound column types supported by the engine.
///
/// This is a closed lattice: declared column types, inferred types, and
/// store mapping types all come from this set. `Array` and `Nested` are
/// compound and carry an inner descriptor in [`super::ColumnType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free-form text.
    Text,
    /// 8-bit signed integer.
    Byte,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 16-bit IEEE float.
    HalfFloat,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// `true` / `false`.
    Boolean,
    /// Calendar date or timestamp, normalized to ISO-8601.
    Date,
    /// Homogeneous list; element type in `inner`.
    Array,
    /// Embedded object with its own fields.
    Nested,
    /// Latitude/longitude pair.
    GeoPoint,
}

impl FieldType {
    /// Returns all supported column types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Text,
            Self::Byte,
            Self::Short,
            Self::Integer,
            Self::Long,
            Self::HalfFloat,
            Self::Float,
            Self::Double,
            Self::Boolean,
            Self::Date,
            Self::Array,
            Self::Nested,
            Self::GeoPoint,
        ]
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::HalfFloat => "half_float",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Array => "array",
            Self::Nested => "nested",
            Self::GeoPoint => "geo_point",
        }
    }

    /// Parses a type name, ignoring ASCII case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "byte" => Some(Self::Byte),
            "short" => Some(Self::Short),
            "integer" => Some(Self::Integer),
            "long" => Some(Self::Long),
            "half_float" => Some(Self::HalfFloat),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "array" => Some(Self::Array),
            "nested" => Some(Self::Nested),
            "geo_point" => Some(Self::GeoPoint),
            _ => None,
        }
    }

    /// Returns true for the numeric types.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::Short
                | Self::Integer
                | Self::Long
                | Self::HalfFloat
                | Self::Float
                | Self::Double
        )
    }

    /// Returns true for integral numeric types.
    #[must_use]
    pub const fn is_integral(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Integer | Self::Long)
    }

    /// Returns true for compound types that require an inner descriptor.
    #[must_use]
    pub const fn is_compound(&self) -> bool {
        matches!(self, Self::Array | Self::Nested)
    }

    /// Returns the existing store types this type may be written into.
    ///
    /// The table is deliberately conservative: a declared type is only
    /// reusable against an existing field when every value it admits is
    /// also admitted by the existing type.
    #[must_use]
    pub const fn compatible_targets(&self) -> &'static [Self] {
        match self {
            Self::Text => &[Self::Text],
            Self::Byte => &[
                Self::Text,
                Self::Byte,
                Self::Short,
                Self::Integer,
                Self::Long,
                Self::HalfFloat,
                Self::Float,
                Self::Double,
            ],
            Self::Short => &[
                Self::Text,
                Self::Short,
                Self::Integer,
                Self::Long,
                Self::Float,
                Self::Double,
            ],
            Self::Integer => &[Self::Text, Self::Integer, Self::Long, Self::Double],
            Self::Long => &[Self::Text, Self::Long],
            Self::HalfFloat => &[Self::Text, Self::HalfFloat, Self::Float, Self::Double],
            Self::Float => &[Self::Text, Self::Float, Self::Double],
            Self::Double => &[Self::Text, Self::Double],
            Self::Boolean => &[Self::Text, Self::Boolean],
            Self::Date => &[Self::Text, Self::Date],
            Self::Array => &[Self::Array],
            Self::Nested => &[Self::Nested],
            Self::GeoPoint => &[Self::Array, Self::GeoPoint],
        }
    }

    /// Returns true if a field of this type may be written into a store
    /// field already mapped as `existing`.
    #[must_use]
    pub fn can_cast_to(&self, existing: Self) -> bool {
        self.compatible_targets().contains(&existing)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_round_trip_strings() {
        for ty in FieldType::all() {
            assert_eq!(FieldType::parse(ty.as_str()), Some(*ty));
        }
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for ty in FieldType::all() {
            let json = serde_json::to_string(ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test_case(FieldType::Integer, FieldType::Long, true; "integer widens to long")]
    #[test_case(FieldType::Integer, FieldType::Double, true; "integer widens to double")]
    #[test_case(FieldType::Long, FieldType::Integer, false; "long does not narrow")]
    #[test_case(FieldType::Boolean, FieldType::Text, true; "boolean casts to text")]
    #[test_case(FieldType::Text, FieldType::Boolean, false; "text does not cast to boolean")]
    #[test_case(FieldType::Date, FieldType::Text, true; "date casts to text")]
    #[test_case(FieldType::Nested, FieldType::Nested, true; "nested only to nested")]
    #[test_case(FieldType::Nested, FieldType::Text, false; "nested never to text")]
    #[test_case(FieldType::GeoPoint, FieldType::Array, true; "geo point stored as array")]
    fn test_cast_table(from: FieldType, to: FieldType, expected: bool) {
        assert_eq!(from.can_cast_to(to), expected);
    }

    #[test]
    fn test_every_type_casts_to_itself() {
        for ty in FieldType::all() {
            assert!(ty.can_cast_to(*ty), "{ty} must be self-compatible");
        }
    }

    #[test]
    fn test_numeric_partition() {
        assert!(FieldType::HalfFloat.is_numeric());
        assert!(FieldType::Byte.is_integral());
        assert!(!FieldType::Float.is_integral());
        assert!(!FieldType::Date.is_numeric());
    }
}
