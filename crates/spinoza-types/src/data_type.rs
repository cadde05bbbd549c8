use serde::{Deserialize, Serialize};

/// The closed set of logical column kinds.
///
/// Each kind maps to an engine column type ([`DataType::engine_type`]) and
/// carries an optional default value serialized as SQL literal text
/// ([`DataType::default_literal`]). `Enum` is the one kind with no default:
/// enum columns must be declared with an explicit default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Row identity. Every table's first column is an `Id` column named `ID`.
    Id,
    /// A UTF-8 text string.
    Str,
    /// A boolean, rendered as `TRUE`/`FALSE` and stored as INTEGER 0/1.
    Bool,
    /// An 8-bit signed integer.
    Byte,
    /// A 16-bit signed integer.
    Short,
    /// A 32-bit signed integer.
    Int,
    /// A 64-bit signed integer.
    Long,
    /// A 32-bit float.
    Float,
    /// A 64-bit float.
    Double,
    /// A byte array, base64-encoded into a quoted TEXT literal.
    Bytes,
    /// An i32 array, serialized little-endian and base64-encoded.
    IntArray,
    /// A point in time, stored as epoch milliseconds (INTEGER).
    Calendar,
    /// A calendar date, stored as quoted ISO text (`YYYY-MM-DD`).
    Date,
    /// A time of day, stored as quoted ISO text (`HH:MM:SS`).
    Time,
    /// A caller-defined enum, stored as quoted `tag:constant` text.
    Enum,
}

impl DataType {
    /// The engine column-type keyword used in DDL.
    pub fn engine_type(self) -> &'static str {
        match self {
            DataType::Id
            | DataType::Bool
            | DataType::Byte
            | DataType::Short
            | DataType::Int
            | DataType::Long
            | DataType::Calendar => "INTEGER",
            DataType::Float | DataType::Double => "REAL",
            DataType::Str
            | DataType::Bytes
            | DataType::IntArray
            | DataType::Date
            | DataType::Time
            | DataType::Enum => "TEXT",
        }
    }

    /// Stable keyword persisted into the catalog mirror.
    pub fn as_keyword(self) -> &'static str {
        match self {
            DataType::Id => "ID",
            DataType::Str => "STRING",
            DataType::Bool => "BOOLEAN",
            DataType::Byte => "BYTE",
            DataType::Short => "SHORT",
            DataType::Int => "INTEGER",
            DataType::Long => "LONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Bytes => "BYTE_ARRAY",
            DataType::IntArray => "INT_ARRAY",
            DataType::Calendar => "CALENDAR",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::Enum => "ENUM",
        }
    }

    /// Inverse of [`DataType::as_keyword`], used when reloading the mirror.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "ID" => DataType::Id,
            "STRING" => DataType::Str,
            "BOOLEAN" => DataType::Bool,
            "BYTE" => DataType::Byte,
            "SHORT" => DataType::Short,
            "INTEGER" => DataType::Int,
            "LONG" => DataType::Long,
            "FLOAT" => DataType::Float,
            "DOUBLE" => DataType::Double,
            "BYTE_ARRAY" => DataType::Bytes,
            "INT_ARRAY" => DataType::IntArray,
            "CALENDAR" => DataType::Calendar,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "ENUM" => DataType::Enum,
            _ => return None,
        })
    }

    /// Default value as SQL literal text. `None` signals "no default":
    /// `Id` columns are allocated by the database and `Enum` columns must be
    /// declared with an explicit default.
    pub fn default_literal(self) -> Option<&'static str> {
        match self {
            DataType::Id | DataType::Enum => None,
            DataType::Str | DataType::Bytes | DataType::IntArray => Some("''"),
            DataType::Bool => Some("FALSE"),
            DataType::Byte | DataType::Short | DataType::Int | DataType::Long => Some("0"),
            DataType::Float | DataType::Double => Some("0.0"),
            DataType::Calendar => Some("0"),
            DataType::Date => Some("'1970-01-01'"),
            DataType::Time => Some("'00:00:00'"),
        }
    }

    /// Whether this kind belongs to the integer family. Used to validate
    /// `id_foreign` targets and `ONE_OF_ID` conditions.
    pub fn is_integer_kind(self) -> bool {
        matches!(
            self,
            DataType::Id | DataType::Byte | DataType::Short | DataType::Int | DataType::Long
        )
    }

    /// Whether this kind belongs to the float family.
    pub fn is_float_kind(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    /// Whether values of this kind have a meaningful ordering for the
    /// `LOWER`/`UPPER` comparison family.
    pub fn is_ordered_kind(self) -> bool {
        self.is_integer_kind()
            || self.is_float_kind()
            || matches!(
                self,
                DataType::Str | DataType::Calendar | DataType::Date | DataType::Time
            )
    }

    /// The compatibility relation used when validating an `IN`-subquery
    /// projection against the outer column: exact match, or both integer
    /// kinds, or both float kinds.
    pub fn compatible_with(self, other: DataType) -> bool {
        self == other
            || (self.is_integer_kind() && other.is_integer_kind())
            || (self.is_float_kind() && other.is_float_kind())
    }
}
