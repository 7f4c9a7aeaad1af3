//! bool, integers and floats.

use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::{FromWireValue, mismatch, utf8};

impl FromWireValue<'_> for bool {
    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::BOOL {
            return Err(mismatch(type_oid, "bool"));
        }
        match bytes {
            b"t" | b"true" | b"TRUE" | b"T" | b"1" => Ok(true),
            b"f" | b"false" | b"FALSE" | b"F" | b"0" => Ok(false),
            _ => Err(Error::Decode(format!(
                "invalid boolean: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        }
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::BOOL {
            return Err(mismatch(type_oid, "bool"));
        }
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(Error::Decode(format!("invalid boolean length: {}", bytes.len()))),
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8], target: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {target} length: {}", bytes.len())))
}

/// Widen a binary integer of any accepted width to `i64`.
fn binary_integer(type_oid: Oid, bytes: &[u8], target: &str) -> Result<i64> {
    Ok(match type_oid {
        oid::INT2 => i64::from(i16::from_be_bytes(fixed(bytes, target)?)),
        oid::INT4 => i64::from(i32::from_be_bytes(fixed(bytes, target)?)),
        oid::INT8 => i64::from_be_bytes(fixed(bytes, target)?),
        oid::OID => i64::from(u32::from_be_bytes(fixed(bytes, target)?)),
        _ => return Err(mismatch(type_oid, target)),
    })
}

macro_rules! impl_integer {
    ($ty:ty, $name:literal, [$($accepted:path),+]) => {
        impl FromWireValue<'_> for $ty {
            fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
                if !matches!(type_oid, $($accepted)|+) {
                    return Err(mismatch(type_oid, $name));
                }
                utf8(bytes)?
                    .parse()
                    .map_err(|e| Error::Decode(format!("invalid {}: {e}", $name)))
            }

            fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
                if !matches!(type_oid, $($accepted)|+) {
                    return Err(mismatch(type_oid, $name));
                }
                let wide = binary_integer(type_oid, bytes, $name)?;
                <$ty>::try_from(wide)
                    .map_err(|_| Error::Decode(format!("{wide} out of range for {}", $name)))
            }
        }
    };
}

impl_integer!(i16, "i16", [oid::INT2]);
impl_integer!(i32, "i32", [oid::INT2, oid::INT4]);
impl_integer!(i64, "i64", [oid::INT2, oid::INT4, oid::INT8, oid::OID]);
impl_integer!(u32, "u32", [oid::OID]);

impl FromWireValue<'_> for f32 {
    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::FLOAT4 {
            return Err(mismatch(type_oid, "f32"));
        }
        parse_float(utf8(bytes)?)
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::FLOAT4 {
            return Err(mismatch(type_oid, "f32"));
        }
        Ok(f32::from_be_bytes(fixed(bytes, "f32")?))
    }
}

impl FromWireValue<'_> for f64 {
    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(type_oid, oid::FLOAT4 | oid::FLOAT8) {
            return Err(mismatch(type_oid, "f64"));
        }
        parse_float(utf8(bytes)?)
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        match type_oid {
            oid::FLOAT4 => Ok(f64::from(f32::from_be_bytes(fixed(bytes, "f64")?))),
            oid::FLOAT8 => Ok(f64::from_be_bytes(fixed(bytes, "f64")?)),
            _ => Err(mismatch(type_oid, "f64")),
        }
    }
}

/// Float text form, including the server's `Infinity` spelling.
fn parse_float<F: std::str::FromStr>(s: &str) -> Result<F> {
    let normalized = match s {
        "Infinity" => "inf",
        "-Infinity" => "-inf",
        other => other,
    };
    normalized
        .parse()
        .map_err(|_| Error::Decode(format!("invalid float: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_widening() {
        assert_eq!(i64::from_binary(oid::INT2, &[0xff, 0xfe]).unwrap(), -2);
        assert_eq!(i32::from_text(oid::INT4, b"-12").unwrap(), -12);
        assert!(i16::from_binary(oid::INT4, &[0, 0, 0, 1]).is_err());
    }

    #[test]
    fn float_specials() {
        assert!(f64::from_text(oid::FLOAT8, b"Infinity").unwrap().is_infinite());
        assert!(f64::from_text(oid::FLOAT8, b"NaN").unwrap().is_nan());
    }

    #[test]
    fn bool_forms() {
        assert!(bool::from_text(oid::BOOL, b"t").unwrap());
        assert!(!bool::from_binary(oid::BOOL, &[0]).unwrap());
        assert!(bool::from_binary(oid::BOOL, &[0, 1]).is_err());
    }
}
