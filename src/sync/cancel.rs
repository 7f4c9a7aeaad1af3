//! Out-of-band cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::opts::SessionOpts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::write_cancel_request;

use super::stream::{Stream, Transport};

#[derive(Debug, Clone)]
enum Target {
    Tcp { host: String, port: u16 },
    Unix(String),
}

/// Cancels whatever is running on one session, from any thread.
#[derive(Debug, Clone)]
pub struct CancelToken {
    target: Target,
    key: BackendKeyData,
    session_broken: Arc<AtomicBool>,
}

impl CancelToken {
    /// Token for the session identified by `key`, reachable through `opts`.
    ///
    /// `session_broken` is the session's shared broken flag, set when the
    /// cancel channel itself faults.
    pub fn new(opts: &SessionOpts, key: BackendKeyData, session_broken: Arc<AtomicBool>) -> Self {
        let target = match &opts.socket {
            Some(path) => Target::Unix(path.clone()),
            None => Target::Tcp {
                host: opts.host.clone(),
                port: opts.port,
            },
        };
        Self {
            target,
            key,
            session_broken,
        }
    }

    pub fn backend_key(&self) -> BackendKeyData {
        self.key
    }

    /// Open a new connection and send a CancelRequest on it.
    ///
    /// The server closes the connection without a reply, so success only
    /// means the request was written.
    pub fn send(&self) -> Result<()> {
        let mut buf = Vec::with_capacity(16);
        write_cancel_request(&mut buf, self.key.pid, self.key.secret_key)?;
        let mut stream = match &self.target {
            Target::Tcp { host, port } => Stream::connect_tcp(host, *port)?,
            Target::Unix(path) => Stream::connect_unix(path)?,
        };
        stream.write_all(&buf)?;
        stream.flush()?;
        tracing::debug!(pid = self.key.pid, "sent cancel request");
        Ok(())
    }

    /// Mark the originating session unusable.
    pub fn invalidate_session(&self) {
        self.session_broken.store(true, Ordering::Release);
    }
}
