//! Session-level backend messages that are not part of a result.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_cstr, read_u8, read_u32};
use crate::protocol::types::TransactionStatus;

/// ReadyForQuery message - the server finished a request cycle.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    /// Transaction status after the cycle
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (byte, _) = read_u8(payload)?;
        let status = TransactionStatus::from_byte(byte).ok_or_else(|| {
            Error::Protocol(format!("unknown transaction status: {}", byte as char))
        })?;
        Ok(Self { status })
    }
}

/// ParameterStatus message - a run-time parameter changed.
#[derive(Debug, Clone, Copy)]
pub struct ParameterStatus<'a> {
    /// Parameter name
    pub name: &'a str,
    /// New value
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, _) = read_cstr(rest)?;
        Ok(Self { name, value })
    }
}

/// NotificationResponse message - a LISTEN channel fired.
#[derive(Debug, Clone, Copy)]
pub struct NotificationResponse<'a> {
    /// PID of the notifying backend
    pub pid: u32,
    /// Channel name
    pub channel: &'a str,
    /// Payload string
    pub payload: &'a str,
}

impl<'a> NotificationResponse<'a> {
    /// Parse a NotificationResponse message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (channel, rest) = read_cstr(rest)?;
        let (payload, _) = read_cstr(rest)?;
        Ok(Self {
            pid,
            channel,
            payload,
        })
    }
}

/// BackendKeyData message - the key needed to cancel queries on this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Backend process ID
    pub pid: u32,
    /// Secret key
    pub secret_key: u32,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (secret_key, _) = read_u32(rest)?;
        Ok(Self { pid, secret_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_for_query_status() {
        let rfq = ReadyForQuery::parse(b"T").unwrap();
        assert_eq!(rfq.status, TransactionStatus::InTransaction);
        assert!(ReadyForQuery::parse(b"?").is_err());
    }

    #[test]
    fn notification() {
        let mut payload = 9_u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"jobs\0done\0");
        let n = NotificationResponse::parse(&payload).unwrap();
        assert_eq!((n.pid, n.channel, n.payload), (9, "jobs", "done"));
    }
}
