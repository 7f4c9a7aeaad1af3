//! Blocking session over an established connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use std_semaphore::Semaphore;

use crate::error::{Error, Result};
use crate::opts::SessionOpts;
use crate::protocol::RawMessage;
use crate::protocol::backend::{
    BackendKeyData, NoticeResponse, NotificationResponse, ParameterStatus, msg_type,
};
use crate::protocol::frontend::{
    DescribeTarget, write_bind, write_describe, write_execute, write_parse, write_query,
    write_sync, write_terminate,
};
use crate::protocol::types::{Oid, TransactionStatus};
use crate::response::Response;
use crate::session::{NotificationBlocker, ProtocolVersion, Session};
use crate::state::{BindMessage, ExecuteMessage};
use crate::types::{EncodeOptions, PgType, TypeCodec};

use super::cancel::CancelToken;
use super::stream::Transport;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// An asynchronous notification received on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub pid: u32,
    pub channel: String,
    pub payload: String,
}

/// Blocking [`Session`] over any [`Transport`].
///
/// Startup and authentication have already happened; the transport is
/// positioned right after the server's first ReadyForQuery.
pub struct WireSession<T: Transport> {
    id: u64,
    transport: T,
    opts: SessionOpts,
    write_buffer: Vec<u8>,
    read_buffer: Vec<u8>,
    /// ReadyForQuery messages requested by queued, unflushed messages.
    queued_ready: usize,
    /// ReadyForQuery messages the server still owes us.
    pending_ready: usize,
    transaction_status: TransactionStatus,
    encode_options: EncodeOptions,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    plan_counter: u64,
    types_by_name: HashMap<String, Oid>,
    types_by_oid: HashMap<Oid, String>,
    notifications: Arc<SegQueue<Notification>>,
    gate: Arc<Semaphore>,
    broken: Arc<AtomicBool>,
    terminated: bool,
}

impl<T: Transport> WireSession<T> {
    pub fn new(transport: T, opts: SessionOpts) -> Self {
        let mut session = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            encode_options: EncodeOptions {
                standard_conforming_strings: opts.standard_conforming_strings,
            },
            opts,
            write_buffer: Vec::with_capacity(1024),
            read_buffer: Vec::with_capacity(1024),
            queued_ready: 0,
            pending_ready: 0,
            transaction_status: TransactionStatus::Idle,
            backend_key: None,
            server_params: Vec::new(),
            plan_counter: 0,
            types_by_name: HashMap::new(),
            types_by_oid: HashMap::new(),
            notifications: Arc::new(SegQueue::new()),
            gate: Arc::new(Semaphore::new(1)),
            broken: Arc::new(AtomicBool::new(false)),
            terminated: false,
        };
        for ty in PgType::all() {
            session.register_type(ty.name(), ty.oid());
        }
        session
    }

    /// Remember the key the server sent during startup.
    pub fn with_backend_key(mut self, key: BackendKeyData) -> Self {
        self.backend_key = Some(key);
        self
    }

    /// Add a type to the catalog used for name/OID lookups.
    pub fn register_type(&mut self, name: &str, oid: Oid) {
        self.types_by_name.insert(name.to_string(), oid);
        self.types_by_oid.insert(oid, name.to_string());
    }

    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Last value the server reported for a run-time parameter.
    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Queue of notifications received so far, shared with listeners.
    pub fn notifications(&self) -> Arc<SegQueue<Notification>> {
        Arc::clone(&self.notifications)
    }

    /// The gate a notification listener must hold while reading.
    pub fn notification_gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }

    /// Token to cancel the running command from another thread.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        let key = self.backend_key?;
        Some(CancelToken::new(&self.opts, key, Arc::clone(&self.broken)))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send Terminate and drop the session.
    pub fn close(mut self) -> Result<()> {
        self.terminate()
    }

    fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        self.write_buffer.clear();
        write_terminate(&mut self.write_buffer)?;
        self.transport.write_all(&self.write_buffer)?;
        self.transport.flush()?;
        Ok(())
    }

    fn queue(&mut self, write: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> Result<()> {
        if self.is_broken() {
            return Err(Error::ConnectionBroken);
        }
        let mark = self.write_buffer.len();
        let result = write(&mut self.write_buffer);
        if result.is_err() {
            self.write_buffer.truncate(mark);
        }
        result
    }

    fn read_message(&mut self) -> Result<u8> {
        let mut type_byte = [0u8; 1];
        self.transport.read_exact(&mut type_byte)?;

        let mut length_bytes = [0u8; 4];
        self.transport.read_exact(&mut length_bytes)?;
        let length = u32::from_be_bytes(length_bytes);

        if length < 4 {
            return Err(Error::Protocol(format!(
                "Invalid message length: {}",
                length
            )));
        }

        let payload_len = (length - 4) as usize;
        self.read_buffer.clear();
        self.read_buffer.resize(payload_len, 0);
        self.transport.read_exact(&mut self.read_buffer)?;
        tracing::trace!(msg = %(type_byte[0] as char), len = payload_len, "backend message");
        Ok(type_byte[0])
    }

    fn handle_async(&mut self, type_byte: u8) -> Result<()> {
        match type_byte {
            msg_type::NOTIFICATION_RESPONSE => {
                let n = NotificationResponse::parse(&self.read_buffer)?;
                self.notifications.push(Notification {
                    pid: n.pid,
                    channel: n.channel.to_string(),
                    payload: n.payload.to_string(),
                });
            }
            msg_type::PARAMETER_STATUS => {
                let p = ParameterStatus::parse(&self.read_buffer)?;
                if p.name == "standard_conforming_strings" {
                    self.encode_options.standard_conforming_strings = p.value == "on";
                }
                match self.server_params.iter_mut().find(|(n, _)| n == p.name) {
                    Some((_, value)) => *value = p.value.to_string(),
                    None => self
                        .server_params
                        .push((p.name.to_string(), p.value.to_string())),
                }
            }
            msg_type::NOTICE_RESPONSE => {
                let notice = NoticeResponse::parse(&self.read_buffer)?;
                tracing::info!(notice = %notice.fields, "server notice");
            }
            _ => {}
        }
        Ok(())
    }
}

impl<T: Transport> Session for WireSession<T> {
    fn session_id(&self) -> u64 {
        self.id
    }

    fn protocol_version(&self) -> ProtocolVersion {
        self.opts.protocol_version
    }

    fn supports_prepare(&self) -> bool {
        self.opts.supports_prepare
    }

    fn always_prepare(&self) -> bool {
        self.opts.always_prepare
    }

    fn default_command_timeout(&self) -> Duration {
        self.opts.command_timeout
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    fn encode_options(&self) -> EncodeOptions {
        self.encode_options
    }

    fn next_plan_name(&mut self) -> String {
        self.plan_counter += 1;
        format!("{}{}", self.opts.plan_name_prefix, self.plan_counter)
    }

    fn type_oid(&self, name: &str) -> Option<Oid> {
        self.types_by_name.get(name).copied()
    }

    fn type_name(&self, oid: Oid) -> Option<String> {
        self.types_by_oid.get(&oid).cloned()
    }

    fn send_parse(&mut self, name: &str, query: &[u8], param_oids: &[Oid]) -> Result<()> {
        self.queue(|buf| write_parse(buf, name, query, param_oids))
    }

    fn send_describe(&mut self, target: DescribeTarget, name: &str) -> Result<()> {
        self.queue(|buf| write_describe(buf, target, name))
    }

    fn send_bind(&mut self, bind: &BindMessage) -> Result<()> {
        self.queue(|buf| {
            write_bind(
                buf,
                &bind.portal,
                &bind.statement,
                &bind.param_formats,
                &bind.values,
                &bind.result_formats,
            )
        })
    }

    fn send_execute(&mut self, execute: &ExecuteMessage) -> Result<()> {
        self.queue(|buf| write_execute(buf, &execute.portal, execute.max_rows))
    }

    fn send_sync(&mut self) -> Result<()> {
        self.queue(write_sync)?;
        self.queued_ready += 1;
        Ok(())
    }

    fn send_query(&mut self, text: &[u8]) -> Result<()> {
        self.queue(|buf| write_query(buf, text))?;
        self.queued_ready += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.is_broken() {
            return Err(Error::ConnectionBroken);
        }
        self.transport.write_all(&self.write_buffer)?;
        self.transport.flush()?;
        tracing::trace!(bytes = self.write_buffer.len(), "flushed");
        self.write_buffer.clear();
        self.pending_ready += std::mem::take(&mut self.queued_ready);
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response> {
        if self.is_broken() {
            return Err(Error::ConnectionBroken);
        }
        loop {
            let type_byte = self.read_message()?;
            if RawMessage::is_async_type(type_byte) {
                self.handle_async(type_byte)?;
                continue;
            }
            let response = Response::parse(RawMessage::new(type_byte, &self.read_buffer))?;
            if let Response::ReadyForQuery(status) = response {
                self.transaction_status = status;
                self.pending_ready = self.pending_ready.saturating_sub(1);
            }
            return Ok(response);
        }
    }

    fn reset_pending_responses(&mut self) -> Result<()> {
        self.write_buffer.clear();
        self.queued_ready = 0;
        if self.pending_ready > 0 {
            tracing::debug!(pending = self.pending_ready, "discarding responses of an earlier exchange");
        }
        while self.pending_ready > 0 {
            self.read_response()?;
        }
        Ok(())
    }

    fn set_operation_timeout(&mut self, timeout: Duration) -> Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        self.transport.set_read_timeout(timeout)?;
        Ok(())
    }

    fn block_notifications(&self) -> NotificationBlocker {
        NotificationBlocker::acquire(&self.gate)
    }

    fn mark_broken(&mut self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            tracing::warn!(session = self.id, "session invalidated");
        }
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }
}

impl<T: Transport> Drop for WireSession<T> {
    fn drop(&mut self) {
        // Try to send Terminate message, ignore errors
        if !self.is_broken() {
            let _ = self.terminate();
        }
    }
}
