//! Decoding column values into Rust types.
//!
//! Values arrive as raw bytes plus the column's type OID and format code.
//! Text format comes from simple queries; binary format from extended
//! executions whose result formats requested it.

mod primitives;
mod string;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};
use crate::value::Value;

/// Trait for decoding PostgreSQL values into Rust types.
///
/// The OID lets implementations reject incompatible column types with a
/// clear error instead of misreading bytes.
pub trait FromWireValue<'a>: Sized {
    /// Decode from NULL. Only nullable targets such as `Option<T>` accept it.
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from text format bytes.
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self>;

    /// Decode from binary format bytes.
    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self>;

    /// Dispatch on nullness and format.
    fn decode(oid: Oid, format: FormatCode, bytes: Option<&'a [u8]>) -> Result<Self> {
        match (bytes, format) {
            (None, _) => Self::from_null(),
            (Some(bytes), FormatCode::Text) => Self::from_text(oid, bytes),
            (Some(bytes), FormatCode::Binary) => Self::from_binary(oid, bytes),
        }
    }
}

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_text(oid, bytes).map(Some)
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_binary(oid, bytes).map(Some)
    }
}

pub(crate) fn mismatch(oid: Oid, target: &str) -> Error {
    Error::Decode(format!("cannot decode oid {oid} as {target}"))
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {e}")))
}

impl FromWireValue<'_> for Value {
    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }

    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        Ok(match type_oid {
            oid::BOOL => Value::Bool(bool::from_text(type_oid, bytes)?),
            oid::INT2 => Value::Int16(i16::from_text(type_oid, bytes)?),
            oid::INT4 => Value::Int32(i32::from_text(type_oid, bytes)?),
            oid::INT8 => Value::Int64(i64::from_text(type_oid, bytes)?),
            oid::FLOAT4 => Value::Float32(f32::from_text(type_oid, bytes)?),
            oid::FLOAT8 => Value::Float64(f64::from_text(type_oid, bytes)?),
            oid::NUMERIC => Value::Numeric(utf8(bytes)?.to_string()),
            oid::BYTEA => Value::Bytes(Vec::<u8>::from_text(type_oid, bytes)?),
            _ => Value::Text(utf8(bytes)?.to_string()),
        })
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        Ok(match type_oid {
            oid::BOOL => Value::Bool(bool::from_binary(type_oid, bytes)?),
            oid::INT2 => Value::Int16(i16::from_binary(type_oid, bytes)?),
            oid::INT4 => Value::Int32(i32::from_binary(type_oid, bytes)?),
            oid::INT8 => Value::Int64(i64::from_binary(type_oid, bytes)?),
            oid::OID => Value::Int64(i64::from(u32::from_binary(type_oid, bytes)?)),
            oid::FLOAT4 => Value::Float32(f32::from_binary(type_oid, bytes)?),
            oid::FLOAT8 => Value::Float64(f64::from_binary(type_oid, bytes)?),
            oid::BYTEA => Value::Bytes(bytes.to_vec()),
            _ => Value::Text(utf8(bytes)?.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_accepts_null() {
        let v: Option<i32> = FromWireValue::decode(oid::INT4, FormatCode::Text, None).unwrap();
        assert_eq!(v, None);
        assert!(<i32 as FromWireValue>::decode(oid::INT4, FormatCode::Text, None).is_err());
    }

    #[test]
    fn value_by_oid() {
        let v = Value::decode(oid::INT8, FormatCode::Binary, Some(&5_i64.to_be_bytes())).unwrap();
        assert_eq!(v, Value::Int64(5));
        let v = Value::decode(oid::REFCURSOR, FormatCode::Text, Some(b"c1")).unwrap();
        assert_eq!(v, Value::Text("c1".into()));
    }
}
