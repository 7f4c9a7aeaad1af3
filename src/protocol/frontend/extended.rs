//! Extended query protocol messages.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

/// What a Describe message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    /// A prepared statement ('S')
    Statement,
    /// A portal ('P')
    Portal,
}

impl DescribeTarget {
    fn tag(self) -> u8 {
        match self {
            DescribeTarget::Statement => b'S',
            DescribeTarget::Portal => b'P',
        }
    }
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: statement name (empty for the unnamed statement)
/// - `query`: SQL with `$1`, `$2`, ... placeholders
/// - `param_oids`: parameter type OIDs (empty or 0 = let the server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &[u8], param_oids: &[Oid]) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstring(query);
    msg.write_count(param_oids.len())?;
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish()
}

/// Write a Bind message creating `portal` from `statement`.
///
/// `values` holds already-encoded parameters; `None` is SQL NULL.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    param_formats: &[FormatCode],
    values: &[Option<Vec<u8>>],
    result_formats: &[FormatCode],
) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr(portal);
    msg.write_cstr(statement);

    msg.write_count(param_formats.len())?;
    for &fmt in param_formats {
        msg.write_i16(fmt as i16);
    }

    msg.write_count(values.len())?;
    for value in values {
        msg.write_value(value.as_deref())?;
    }

    msg.write_count(result_formats.len())?;
    for &fmt in result_formats {
        msg.write_i16(fmt as i16);
    }
    msg.finish()
}

/// Write an Execute message to run a portal (`max_rows` 0 = unlimited).
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_u32(max_rows);
    msg.finish()
}

/// Write a Describe message for a statement or portal.
pub fn write_describe(buf: &mut Vec<u8>, target: DescribeTarget, name: &str) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(target.tag());
    msg.write_cstr(name);
    msg.finish()
}

/// Write a Sync message.
///
/// Ends an extended query sequence; the server answers with ReadyForQuery,
/// and after an error it skips everything up to this point.
pub fn write_sync(buf: &mut Vec<u8>) -> Result<()> {
    MessageBuilder::new(buf, super::msg_type::SYNC).finish()
}
