//! The session a command executes on.
//!
//! [`Session`] is the boundary between the command core and the connection
//! that owns the socket. The core only queues frontend messages, reads
//! decoded [`Response`]s and toggles a few pieces of per-session state.
//! [`crate::sync::WireSession`] is the blocking implementation shipped with
//! the crate; tests and other transports can provide their own.

use std::sync::Arc;
use std::time::Duration;

use std_semaphore::Semaphore;

use crate::error::Result;
use crate::protocol::frontend::DescribeTarget;
use crate::protocol::types::{Oid, TransactionStatus};
use crate::response::{Response, ResponseStream};
use crate::state::{BindMessage, ExecuteMessage};
use crate::types::EncodeOptions;

/// Protocol generation negotiated for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// Simple query only; prepared statements go through `PREPARE`/`EXECUTE`.
    V2,
    /// Extended query protocol.
    #[default]
    V3,
}

impl ProtocolVersion {
    /// Whether function calls can be written as `SELECT * FROM f(...)`.
    pub fn supports_set_returning_calls(self) -> bool {
        matches!(self, ProtocolVersion::V3)
    }
}

/// Holds the session's notification gate until dropped.
///
/// While a blocker is alive no notification listener may read from the
/// session's transport.
pub struct NotificationBlocker {
    gate: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for NotificationBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBlocker")
            .field("held", &self.gate.is_some())
            .finish()
    }
}

impl NotificationBlocker {
    /// Wait for `gate` and hold it.
    pub fn acquire(gate: &Arc<Semaphore>) -> Self {
        gate.acquire();
        Self {
            gate: Some(Arc::clone(gate)),
        }
    }

    /// A blocker for sessions without a notification listener.
    pub fn none() -> Self {
        Self { gate: None }
    }
}

impl Drop for NotificationBlocker {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

/// A protocol session commands are executed on.
///
/// `send_*` methods queue a message; nothing reaches the server before
/// [`Session::flush`]. `read_response` returns the next response of the
/// current exchange, consuming asynchronous messages internally.
pub trait Session {
    /// Identity used to detect a command moving between sessions.
    fn session_id(&self) -> u64;

    fn protocol_version(&self) -> ProtocolVersion;

    /// Whether server-side prepared statements may be used at all.
    fn supports_prepare(&self) -> bool;

    /// Whether commands attached to this session are prepared automatically.
    fn always_prepare(&self) -> bool;

    /// Command timeout inherited by attached commands. Zero means no timeout.
    fn default_command_timeout(&self) -> Duration;

    /// Status reported by the last ReadyForQuery.
    fn transaction_status(&self) -> TransactionStatus;

    fn encode_options(&self) -> EncodeOptions;

    /// A plan name not used before on this session.
    fn next_plan_name(&mut self) -> String;

    /// Catalog lookup: OID of the type called `name`.
    fn type_oid(&self, name: &str) -> Option<Oid>;

    /// Catalog lookup: name of the type with `oid`.
    fn type_name(&self, oid: Oid) -> Option<String>;

    fn send_parse(&mut self, name: &str, query: &[u8], param_oids: &[Oid]) -> Result<()>;
    fn send_describe(&mut self, target: DescribeTarget, name: &str) -> Result<()>;
    fn send_bind(&mut self, bind: &BindMessage) -> Result<()>;
    fn send_execute(&mut self, execute: &ExecuteMessage) -> Result<()>;
    fn send_sync(&mut self) -> Result<()>;
    fn send_query(&mut self, text: &[u8]) -> Result<()>;

    /// Write every queued message to the server.
    fn flush(&mut self) -> Result<()>;

    fn read_response(&mut self) -> Result<Response>;

    /// Discard responses still pending from an earlier exchange.
    fn reset_pending_responses(&mut self) -> Result<()>;

    /// Timeout for the reads of the next exchange. Zero disables it.
    fn set_operation_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Block the notification listener for the duration of an exchange.
    fn block_notifications(&self) -> NotificationBlocker;

    /// Invalidate the session after a transport fault. It must not be reused.
    fn mark_broken(&mut self);

    fn is_broken(&self) -> bool;

    /// Response sequence of the exchange just flushed. `blocker` is held
    /// until the sequence is dropped.
    fn drain_responses(&mut self, blocker: NotificationBlocker) -> ResponseStream<'_, Self>
    where
        Self: Sized,
    {
        ResponseStream::new(self, blocker)
    }
}
