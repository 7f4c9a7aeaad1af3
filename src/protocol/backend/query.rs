//! Result-carrying backend messages.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_cstr, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: U16BE,
}

impl FieldDescriptionTail {
    /// Data type OID
    pub fn type_oid(&self) -> Oid {
        self.type_oid.get()
    }

    /// Type modifier (type-specific)
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier.get()
    }

    /// Format code the column values are sent in.
    pub fn format(&self) -> FormatCode {
        FormatCode::from_u16(self.format.get())
    }
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    /// Field name
    pub name: &'a str,
    /// Fixed-size metadata
    pub tail: &'a FieldDescriptionTail,
}

/// RowDescription message - describes the columns of a result set.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail, rest) = rest
                .split_at_checked(TAIL_SIZE)
                .ok_or_else(|| Error::Protocol("FieldDescription tail truncated".into()))?;
            let tail = FieldDescriptionTail::ref_from_bytes(tail)
                .map_err(|e| Error::Protocol(format!("FieldDescription tail: {e:?}")))?;
            fields.push(FieldDescription { name, tail });
            data = rest;
        }
        Ok(Self { fields })
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

/// DataRow message - one row of column values.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, columns_data) = read_u16(payload)?;
        Ok(Self {
            num_columns,
            columns_data,
        })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Iterate over column values; `None` items are SQL NULL.
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
        }
    }

    /// Get a column value by index.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        self.iter().nth(index)
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let (len, rest) = self.remaining.split_first_chunk::<4>()?;
        let len = i32::from_be_bytes(*len);
        if len < 0 {
            self.remaining = rest;
            return Some(None);
        }
        let (value, rest) = rest.split_at_checked(len as usize)?;
        self.remaining = rest;
        Some(Some(value))
    }
}

/// CommandComplete message - a statement finished.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }
}

/// Rows affected according to a command tag, if the command reports a count.
pub fn tag_rows_affected(tag: &str) -> Option<u64> {
    let mut parts = tag.split_whitespace();
    match (parts.next()?, parts.next(), parts.next()) {
        ("INSERT", Some(_oid), Some(count)) => count.parse().ok(),
        ("SELECT" | "UPDATE" | "DELETE" | "COPY" | "MOVE" | "FETCH" | "MERGE", Some(count), None) => {
            count.parse().ok()
        }
        _ => None,
    }
}

/// OID of the inserted row for a single-row `INSERT <oid> 1` tag, if non-zero.
pub fn tag_inserted_oid(tag: &str) -> Option<Oid> {
    let mut parts = tag.split_whitespace();
    match (parts.next()?, parts.next(), parts.next()) {
        ("INSERT", Some(oid), Some("1")) => oid.parse().ok().filter(|&oid: &Oid| oid != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_description_two_fields() {
        let mut payload = vec![0, 2];
        for (name, oid) in [("id", 23_u32), ("name", 25)] {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(&0_u32.to_be_bytes());
            payload.extend_from_slice(&0_i16.to_be_bytes());
            payload.extend_from_slice(&oid.to_be_bytes());
            payload.extend_from_slice(&(-1_i16).to_be_bytes());
            payload.extend_from_slice(&(-1_i32).to_be_bytes());
            payload.extend_from_slice(&1_u16.to_be_bytes());
        }
        let desc = RowDescription::parse(&payload).unwrap();
        let fields = desc.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[1].tail.type_oid(), 25);
        assert_eq!(fields[1].tail.format(), FormatCode::Binary);
    }

    #[test]
    fn truncated_row_description_is_an_error() {
        assert!(RowDescription::parse(&[0, 1, b'x', 0, 0]).is_err());
        assert!(RowDescription::parse(&[0]).is_err());
    }

    #[test]
    fn data_row_with_null() {
        let mut payload = vec![0, 2];
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&2_i32.to_be_bytes());
        payload.extend_from_slice(b"ok");
        let row = DataRow::parse(&payload).unwrap();
        assert_eq!(row.len(), 2);
        let values: Vec<_> = row.iter().collect();
        assert_eq!(values, vec![None, Some(&b"ok"[..])]);
    }

    #[test]
    fn command_tags() {
        assert_eq!(tag_rows_affected("INSERT 0 3"), Some(3));
        assert_eq!(tag_rows_affected("UPDATE 10"), Some(10));
        assert_eq!(tag_rows_affected("CREATE TABLE"), None);
        assert_eq!(tag_inserted_oid("INSERT 16403 1"), Some(16403));
        assert_eq!(tag_inserted_oid("INSERT 0 1"), None);
        assert_eq!(tag_inserted_oid("INSERT 16403 2"), None);
    }
}
