//! Transactions commands can be enlisted in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::session::Session;

/// A transaction on one session.
///
/// This struct provides transaction control. The session is passed to
/// `commit` and `rollback` to execute the transaction commands. Clones
/// share the open flag, so a command enlisted with a clone sees the
/// transaction end.
#[derive(Debug, Clone)]
pub struct Transaction {
    session_id: u64,
    open: Arc<AtomicBool>,
}

impl Transaction {
    /// Send `BEGIN` on `session`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the session is already in a transaction.
    pub fn begin<S: Session>(session: &mut S) -> Result<Self> {
        if session.transaction_status().in_transaction() {
            return Err(Error::usage("nested transactions are not supported"));
        }
        Command::with_session("BEGIN", session).execute_blind(session)?;
        Ok(Self {
            session_id: session.session_id(),
            open: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// False once committed or rolled back.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the session is not the same
    /// as the one that started the transaction.
    pub fn commit<S: Session>(self, session: &mut S) -> Result<()> {
        self.finish(session, "COMMIT")
    }

    /// Rollback the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the session is not the same
    /// as the one that started the transaction.
    pub fn rollback<S: Session>(self, session: &mut S) -> Result<()> {
        self.finish(session, "ROLLBACK")
    }

    fn finish<S: Session>(self, session: &mut S, sql: &str) -> Result<()> {
        let actual = session.session_id();
        if self.session_id != actual {
            return Err(Error::InvalidUsage(format!(
                "session mismatch: expected {}, got {}",
                self.session_id, actual
            )));
        }
        Command::with_session(sql, session).execute_blind(session)?;
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}
