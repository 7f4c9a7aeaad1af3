//! Simple query protocol messages and out-of-band requests.

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

/// Cancel request code
pub const CANCEL_REQUEST_CODE: i32 = 80877102;

/// Write a Query message.
///
/// The text may contain several statements separated by semicolons. It must
/// not contain a NUL byte, which would end the string on the wire.
pub fn write_query(buf: &mut Vec<u8>, query: &[u8]) -> Result<()> {
    if memchr::memchr(0, query).is_some() {
        return Err(Error::Encode("query text contains a NUL byte".into()));
    }
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstring(query);
    msg.finish()
}

/// Write a CancelRequest message.
///
/// Sent on a NEW connection to cancel the query running on another one.
/// The server closes the connection without answering.
pub fn write_cancel_request(buf: &mut Vec<u8>, pid: u32, secret_key: u32) -> Result<()> {
    let mut msg = MessageBuilder::new_untyped(buf);
    msg.write_i32(CANCEL_REQUEST_CODE);
    msg.write_u32(pid);
    msg.write_u32(secret_key);
    msg.finish()
}

/// Write a Terminate message.
pub fn write_terminate(buf: &mut Vec<u8>) -> Result<()> {
    MessageBuilder::new(buf, super::msg_type::TERMINATE).finish()
}
