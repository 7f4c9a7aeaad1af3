//! Strings and byte arrays.

use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::{FromWireValue, mismatch, utf8};

/// Types whose binary representation is their UTF-8 text.
fn is_text_like(type_oid: Oid) -> bool {
    matches!(
        type_oid,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::REFCURSOR | oid::UNKNOWN
    )
}

impl<'a> FromWireValue<'a> for &'a str {
    /// Any column has a text form, so text format accepts every OID.
    fn from_text(_type_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        utf8(bytes)
    }

    fn from_binary(type_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if !is_text_like(type_oid) {
            return Err(mismatch(type_oid, "str"));
        }
        utf8(bytes)
    }
}

impl FromWireValue<'_> for String {
    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_text(type_oid, bytes).map(str::to_owned)
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_binary(type_oid, bytes).map(str::to_owned)
    }
}

impl FromWireValue<'_> for Vec<u8> {
    fn from_text(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::BYTEA {
            return Err(mismatch(type_oid, "Vec<u8>"));
        }
        match bytes.strip_prefix(b"\\x") {
            Some(hex) => decode_hex(hex),
            None => Ok(bytes.to_vec()),
        }
    }

    fn from_binary(type_oid: Oid, bytes: &[u8]) -> Result<Self> {
        if type_oid != oid::BYTEA {
            return Err(mismatch(type_oid, "Vec<u8>"));
        }
        Ok(bytes.to_vec())
    }
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    fn nibble(c: u8) -> Result<u8> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(Error::Decode(format!("invalid hex digit: {}", c as char))),
        }
    }
    let pairs = hex.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        return Err(Error::Decode("odd number of hex digits".into()));
    }
    pairs
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}
