//! Binary encoding of [`SqlValue`] parameters.
//!
//! Insert statements are prepared on the target, so the server decides each
//! parameter's type. Encoding follows that type and coerces the value where
//! the conversion is exact; anything else is an error for the row.

use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::core::value::SqlValue;

type BoxError = Box<dyn Error + Sync + Send>;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => self.to_bool(ty)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(self.to_i64(ty)?)
                .map_err(|_| out_of_range(self, ty))?
                .to_sql(ty, out),
            Type::INT4 => i32::try_from(self.to_i64(ty)?)
                .map_err(|_| out_of_range(self, ty))?
                .to_sql(ty, out),
            Type::INT8 => self.to_i64(ty)?.to_sql(ty, out),
            Type::FLOAT4 => (self.to_f64(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.to_f64(ty)?.to_sql(ty, out),
            Type::NUMERIC => self.to_decimal(ty)?.to_sql(ty, out),
            Type::TIMESTAMP => self.to_datetime(ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => Utc.from_utc_datetime(&self.to_datetime(ty)?).to_sql(ty, out),
            Type::DATE => self.to_date(ty)?.to_sql(ty, out),
            Type::TIME => self.to_time(ty)?.to_sql(ty, out),
            Type::BYTEA => match self {
                SqlValue::Bytes(b) => b.as_slice().to_sql(ty, out),
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::JSON | Type::JSONB => {
                let text = self.to_text().ok_or_else(|| mismatch(self, ty))?;
                serde_json::from_str::<serde_json::Value>(&text)?.to_sql(ty, out)
            }
            Type::UUID => {
                let id = match self {
                    SqlValue::Bytes(b) => uuid::Uuid::from_slice(b)?,
                    SqlValue::Text(s) => uuid::Uuid::parse_str(s.trim())?,
                    _ => return Err(mismatch(self, ty)),
                };
                id.to_sql(ty, out)
            }
            _ if <&str as ToSql>::accepts(ty) => {
                let text = self.to_text().ok_or_else(|| mismatch(self, ty))?;
                text.as_str().to_sql(ty, out)
            }
            _ => Err(mismatch(self, ty)),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl SqlValue {
    fn to_bool(&self, ty: &Type) -> Result<bool, BoxError> {
        match self {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Ok(true),
                "0" | "f" | "false" | "n" | "no" => Ok(false),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Bytes(b) if b.len() == 1 => Ok(b[0] != 0),
            other => other
                .to_i64(ty)
                .map(|v| v != 0),
        }
    }

    fn to_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match self {
            SqlValue::Bool(b) => Ok(*b as i64),
            SqlValue::U64(v) => i64::try_from(*v).map_err(|_| out_of_range(self, ty)),
            SqlValue::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().ok_or_else(|| out_of_range(self, ty))
            }
            SqlValue::Text(s) => Ok(s.trim().parse::<i64>()?),
            other => other.as_i64().ok_or_else(|| mismatch(self, ty)),
        }
    }

    fn to_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match self {
            SqlValue::F32(v) => Ok(*v as f64),
            SqlValue::F64(v) => Ok(*v),
            SqlValue::U64(v) => Ok(*v as f64),
            SqlValue::Decimal(d) => d.to_f64().ok_or_else(|| out_of_range(self, ty)),
            SqlValue::Text(s) => Ok(s.trim().parse::<f64>()?),
            other => other
                .as_i64()
                .map(|v| v as f64)
                .ok_or_else(|| mismatch(self, ty)),
        }
    }

    fn to_decimal(&self, ty: &Type) -> Result<Decimal, BoxError> {
        match self {
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::U64(v) => Ok(Decimal::from(*v)),
            SqlValue::F32(v) => Ok(Decimal::try_from(*v)?),
            SqlValue::F64(v) => Ok(Decimal::try_from(*v)?),
            SqlValue::Text(s) => Ok(Decimal::from_str(s.trim())?),
            other => other
                .as_i64()
                .map(Decimal::from)
                .ok_or_else(|| mismatch(self, ty)),
        }
    }

    fn to_datetime(&self, ty: &Type) -> Result<NaiveDateTime, BoxError> {
        match self {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SqlValue::Text(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
                .ok_or_else(|| mismatch(self, ty)),
            _ => Err(mismatch(self, ty)),
        }
    }

    fn to_date(&self, ty: &Type) -> Result<NaiveDate, BoxError> {
        match self {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::DateTime(dt) => Ok(dt.date()),
            SqlValue::Text(s) => Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?),
            _ => Err(mismatch(self, ty)),
        }
    }

    fn to_time(&self, ty: &Type) -> Result<NaiveTime, BoxError> {
        match self {
            SqlValue::Time(t) => Ok(*t),
            SqlValue::DateTime(dt) => Ok(dt.time()),
            SqlValue::Text(s) => Ok(NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?),
            _ => Err(mismatch(self, ty)),
        }
    }
}

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot encode {} value {} as {}", value.kind(), value, ty).into()
}

fn out_of_range(value: &SqlValue, ty: &Type) -> BoxError {
    format!("value {} out of range for {}", value, ty).into()
}
