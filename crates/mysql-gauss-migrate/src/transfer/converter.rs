//! Per-column value converters.
//!
//! A converter is picked once per column from its source type when a table is
//! opened, then applied to that column's value in every row.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::core::value::SqlValue;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Conversion applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeConverter {
    /// Small integers written to a SMALLINT column.
    NarrowInteger,
    /// BLOB and binary types.
    Binary,
    /// Character types.
    Text,
    /// DECIMAL / NUMERIC.
    ExactDecimal,
    /// DATETIME / TIMESTAMP.
    DateTime,
    /// Driver value copied unchanged.
    Passthrough,
}

impl TypeConverter {
    /// Select the converter for a source column type.
    pub fn for_source_type(source_type: &str) -> Self {
        match source_type.to_uppercase().as_str() {
            "TINYINT" => TypeConverter::NarrowInteger,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                TypeConverter::Binary
            }
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => {
                TypeConverter::Text
            }
            "DECIMAL" | "NUMERIC" => TypeConverter::ExactDecimal,
            "DATETIME" | "TIMESTAMP" => TypeConverter::DateTime,
            _ => TypeConverter::Passthrough,
        }
    }

    /// Whether [`convert`](Self::convert) can reject a value.
    pub fn is_fallible(&self) -> bool {
        !matches!(self, TypeConverter::Passthrough | TypeConverter::Text)
    }

    /// Convert one value. NULL always stays NULL.
    ///
    /// The error is a short reason; the caller adds table and column context.
    pub fn convert(&self, value: SqlValue) -> Result<SqlValue, String> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self {
            TypeConverter::Passthrough => Ok(value),
            TypeConverter::NarrowInteger => narrow_integer(value),
            TypeConverter::Binary => match value {
                SqlValue::Bytes(b) => Ok(SqlValue::Bytes(b)),
                SqlValue::Text(s) => Ok(SqlValue::Bytes(s.into_bytes())),
                other => Err(format!("expected binary data, got {}", other.kind())),
            },
            TypeConverter::Text => match value.to_text() {
                Some(text) => Ok(SqlValue::Text(text)),
                None => Ok(SqlValue::Null),
            },
            TypeConverter::ExactDecimal => exact_decimal(value),
            TypeConverter::DateTime => date_time(value),
        }
    }
}

fn narrow_integer(value: SqlValue) -> Result<SqlValue, String> {
    let wide = match &value {
        SqlValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("not an integer: {}", e))?,
        other => other
            .as_i64()
            .ok_or_else(|| format!("expected an integer, got {}", other.kind()))?,
    };
    i16::try_from(wide)
        .map(SqlValue::I16)
        .map_err(|_| format!("{} does not fit in SMALLINT", wide))
}

fn exact_decimal(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Decimal(d) => Ok(SqlValue::Decimal(d)),
        SqlValue::F32(f) => Decimal::try_from(f)
            .map(SqlValue::Decimal)
            .map_err(|e| e.to_string()),
        SqlValue::F64(f) => Decimal::try_from(f)
            .map(SqlValue::Decimal)
            .map_err(|e| e.to_string()),
        SqlValue::Text(s) => Decimal::from_str(s.trim())
            .map(SqlValue::Decimal)
            .map_err(|e| format!("not a decimal: {}", e)),
        SqlValue::U64(v) => Ok(SqlValue::Decimal(Decimal::from(v))),
        other => other
            .as_i64()
            .map(|v| SqlValue::Decimal(Decimal::from(v)))
            .ok_or_else(|| format!("expected a decimal, got {}", other.kind())),
    }
}

fn date_time(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::DateTime(dt) => Ok(SqlValue::DateTime(dt)),
        SqlValue::Date(d) => Ok(SqlValue::DateTime(d.and_time(NaiveTime::MIN))),
        SqlValue::Text(s) => parse_datetime(s.trim())
            .map(SqlValue::DateTime)
            .ok_or_else(|| format!("not a datetime: {}", s)),
        other => Err(format!("expected a datetime, got {}", other.kind())),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
