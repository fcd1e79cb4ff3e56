//! Column data types.

use serde::{Deserialize, Serialize};

/// SQL column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single precision float.
    Real,
    /// Double precision float.
    Double,
    /// Fixed-point decimal.
    Numeric {
        /// Total digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Boolean.
    Boolean,
    /// Fixed-length character string.
    Char(u32),
    /// Variable-length character string with a limit.
    Varchar(u32),
    /// Unbounded text.
    Text,
    /// Calendar date.
    Date,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// UUID.
    Uuid,
    /// Binary data.
    Bytea,
}

impl ColumnType {
    /// SQL spelling of the type.
    pub fn sql(&self) -> String {
        match self {
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Real => "real".to_string(),
            ColumnType::Double => "double precision".to_string(),
            ColumnType::Numeric { precision, scale } => format!("numeric({precision}, {scale})"),
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::Char(len) => format!("char({len})"),
            ColumnType::Varchar(len) => format!("varchar({len})"),
            ColumnType::Text => "text".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Timestamp => "timestamp".to_string(),
            ColumnType::TimestampTz => "timestamptz".to_string(),
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::Bytea => "bytea".to_string(),
        }
    }

    /// Deterministic literal used as the identity of placeholder rows and as
    /// the stand-in value for required columns that have not been copied yet.
    ///
    /// Integer types use their minimum value so they cannot collide with
    /// sequence-generated keys.
    pub fn sentinel(&self) -> &'static str {
        match self {
            ColumnType::SmallInt => "-32768",
            ColumnType::Integer => "-2147483648",
            ColumnType::BigInt => "-9223372036854775808",
            ColumnType::Real | ColumnType::Double | ColumnType::Numeric { .. } => "0",
            ColumnType::Boolean => "false",
            ColumnType::Char(_) | ColumnType::Varchar(_) | ColumnType::Text => "''",
            ColumnType::Date => "'1970-01-01'",
            ColumnType::Timestamp | ColumnType::TimestampTz => "'1970-01-01 00:00:00'",
            ColumnType::Uuid => "'00000000-0000-0000-0000-000000000000'",
            ColumnType::Bytea => "''::bytea",
        }
    }

    /// Width in bits of integer types.
    pub fn integer_bits(&self) -> Option<u32> {
        match self {
            ColumnType::SmallInt => Some(16),
            ColumnType::Integer => Some(32),
            ColumnType::BigInt => Some(64),
            _ => None,
        }
    }

    /// Check if this is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql())
    }
}
