//! SQL value type carried from the source cursor to the target insert.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A single column value in a transferred row.
///
/// Source drivers produce the closest native variant; converters may reshape
/// it before the target driver encodes it for the column's actual type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 8-bit signed integer (tinyint).
    I8(i8),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int, mediumint).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 64-bit unsigned integer (bigint unsigned).
    U64(u64),

    /// 32-bit floating point (float).
    F32(f32),

    /// 64-bit floating point (double).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Exact decimal.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it is integral and fits in an i64.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::I8(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Short name of the variant, used in conversion error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I8(_) => "i8",
            SqlValue::I16(_) => "i16",
            SqlValue::I32(_) => "i32",
            SqlValue::I64(_) => "i64",
            SqlValue::U64(_) => "u64",
            SqlValue::F32(_) => "f32",
            SqlValue::F64(_) => "f64",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }

    /// Text form of the value as the target would accept it in a text column.
    ///
    /// Bytes are decoded as UTF-8 (lossy); NULL has no text form.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            SqlValue::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I8(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::U64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One row, values in column ordinal order.
pub type Row = Vec<SqlValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64() {
        assert_eq!(SqlValue::I8(-3).as_i64(), Some(-3));
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::U64(u64::MAX).as_i64(), None);
        assert_eq!(SqlValue::Text("1".into()).as_i64(), None);
    }

    #[test]
    fn test_display_for_logging() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(SqlValue::from("abc").to_string(), "'abc'");
    }

    #[test]
    fn test_to_text() {
        assert_eq!(SqlValue::Null.to_text(), None);
        assert_eq!(SqlValue::I32(7).to_text().as_deref(), Some("7"));
        assert_eq!(
            SqlValue::Bytes(b"hi".to_vec()).to_text().as_deref(),
            Some("hi")
        );
        let dt = NaiveDate::from_ymd_opt(2024, 10, 10)
            .unwrap()
            .and_hms_opt(14, 19, 0)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_text().as_deref(),
            Some("2024-10-10 14:19:00")
        );
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(5i64)), SqlValue::I64(5));
    }
}
