//! Wire encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.

use crate::error::{Error, Result};

#[inline]
fn take<'a, const N: usize>(data: &'a [u8], what: &str) -> Result<([u8; N], &'a [u8])> {
    let (head, rest) = data.split_first_chunk::<N>().ok_or_else(|| {
        Error::Protocol(format!("{what}: buffer too short: {} < {N}", data.len()))
    })?;
    Ok((*head, rest))
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    let ([b], rest) = take::<1>(data, "read_u8")?;
    Ok((b, rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (b, rest) = take::<2>(data, "read_u16")?;
    Ok((u16::from_be_bytes(b), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (b, rest) = take::<4>(data, "read_u32")?;
    Ok((u32::from_be_bytes(b), rest))
}

/// Split off a null-terminated string, dropping the terminator.
#[inline]
fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let pos = memchr::memchr(0, data)
        .ok_or_else(|| Error::Protocol("read_cstring: no null terminator found".into()))?;
    let (bytes, rest) = data.split_at(pos);
    Ok((bytes, rest.get(1..).unwrap_or_default()))
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Message builder that back-fills the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_untyped(buf)
    }

    /// Start building a message without a type byte (CancelRequest).
    pub fn new_untyped(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write a null-terminated string from raw bytes.
    pub fn write_cstring(&mut self, s: &[u8]) {
        self.buf.extend_from_slice(s);
        self.buf.push(0);
    }

    /// Write a null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        self.write_cstring(s.as_bytes());
    }

    /// Write a count field as i16, failing if it does not fit.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = i16::try_from(count)
            .map_err(|_| Error::Encode(format!("too many items for one message: {count}")))?;
        self.write_i16(count);
        Ok(())
    }

    /// Write a length-prefixed value; `None` is encoded as length -1.
    pub fn write_value(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            Some(data) => {
                let len = i32::try_from(data.len())
                    .map_err(|_| Error::Encode(format!("value too large: {} bytes", data.len())))?;
                self.write_i32(len);
                self.write_bytes(data);
            }
            None => self.write_i32(-1),
        }
        Ok(())
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) -> Result<()> {
        let len = i32::try_from(self.buf.len() - self.start)
            .map_err(|_| Error::Encode("message exceeds 2GiB".into()))?;
        if let Some(slot) = self.buf.get_mut(self.start..self.start + 4) {
            slot.copy_from_slice(&len.to_be_bytes());
        }
        Ok(())
    }
}
