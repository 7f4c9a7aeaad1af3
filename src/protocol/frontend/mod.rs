//! PostgreSQL frontend (client → server) messages.

pub mod extended;
pub mod simple;

pub use extended::{
    DescribeTarget, write_bind, write_describe, write_execute, write_parse, write_sync,
};
pub use simple::{CANCEL_REQUEST_CODE, write_cancel_request, write_query, write_terminate};

/// Frontend message type bytes.
pub mod msg_type {
    pub const QUERY: u8 = b'Q';
    pub const TERMINATE: u8 = b'X';

    // extended query protocol
    pub const PARSE: u8 = b'P';
    pub const BIND: u8 = b'B';
    pub const DESCRIBE: u8 = b'D';
    pub const EXECUTE: u8 = b'E';
    pub const SYNC: u8 = b'S';
}
