//! Commands and their execution.
//!
//! A [`Command`] owns its text, parameters and prepare state. Executing it
//! picks one of two flows:
//!
//! - **simple**: the whole text, with parameter values inlined (or an
//!   `EXECUTE <plan>(...)` for V2 plans), goes out as one Query message;
//! - **extended**: the V3 plan's Bind template is refreshed with the current
//!   parameter values and sent with Execute and Sync.
//!
//! Every exchange first drops responses left over from an earlier one,
//! re-arms the operation timeout and holds the session's notification gate
//! until its response sequence is dropped.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::function;
use crate::parameter::ParameterSet;
use crate::protocol::frontend::DescribeTarget;
use crate::protocol::types::Oid;
use crate::reader::Reader;
use crate::response::{Response, ResponseStream};
use crate::session::{ProtocolVersion, Session};
use crate::sql::rewriter::{CallShape, Mode, Rewriter};
use crate::state::{PrepareState, PreparedPlan, bind_parameters};
use crate::transaction::Transaction;
use crate::value::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// SQL text, possibly several statements.
    #[default]
    Text,
    /// A function name, optionally with an argument list.
    StoredProcedure,
    /// A table name; every row is selected.
    TableDirect,
}

/// How one execution reaches the server.
enum Flow {
    /// One Query message carrying this text.
    Simple(Vec<u8>),
    /// Bind/Execute against the V3 plan.
    Extended,
}

/// Run `f`, invalidating the session if it hits a transport fault.
fn guard<S: Session, T>(session: &mut S, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
    match f(session) {
        Ok(value) => Ok(value),
        Err(Error::ConnectionBroken) => Err(Error::ConnectionBroken),
        Err(e) if e.is_connection_broken() => {
            session.mark_broken();
            Err(Error::Broken(Box::new(e)))
        }
        Err(e) => Err(e),
    }
}

fn begin_exchange<S: Session>(session: &mut S, timeout: Duration) -> Result<()> {
    guard(session, |s| s.reset_pending_responses())?;
    guard(session, |s| s.set_operation_timeout(timeout))
}

fn send_simple<'s, S: Session>(
    session: &'s mut S,
    text: &[u8],
    timeout: Duration,
) -> Result<ResponseStream<'s, S>> {
    begin_exchange(session, timeout)?;
    let blocker = session.block_notifications();
    guard(session, |s| {
        s.send_query(text)?;
        s.flush()
    })?;
    Ok(session.drain_responses(blocker))
}

/// An SQL command bound to parameters.
#[derive(Debug)]
pub struct Command {
    text: String,
    command_type: CommandType,
    parameters: ParameterSet,
    timeout: Duration,
    timeout_set: bool,
    state: PrepareState,
    session_id: Option<u64>,
    transaction: Option<Transaction>,
    /// Whether the called function needs an `AS (...)` list; checked once per text.
    needs_column_list: Option<bool>,
    last_inserted_oid: Option<Oid>,
}

impl Command {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            command_type: CommandType::Text,
            parameters: ParameterSet::new(),
            timeout: DEFAULT_TIMEOUT,
            timeout_set: false,
            state: PrepareState::NotPrepared,
            session_id: None,
            transaction: None,
            needs_column_list: None,
            last_inserted_oid: None,
        }
    }

    /// A command attached to `session`, inheriting its timeout and prepare policy.
    pub fn with_session<S: Session>(text: &str, session: &S) -> Self {
        let mut command = Self::new(text);
        command.attach(session);
        command
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text. A prepared plan no longer matches and is dropped.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.state.unprepare();
        self.needs_column_list = None;
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn set_command_type(&mut self, command_type: CommandType) {
        if self.command_type != command_type {
            self.command_type = command_type;
            self.state.unprepare();
            self.needs_column_list = None;
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }

    pub fn command_timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the timeout in seconds; 0 disables it.
    ///
    /// Once set explicitly the timeout is no longer inherited from sessions.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` for a negative value.
    pub fn set_command_timeout(&mut self, seconds: i32) -> Result<()> {
        let seconds = u64::try_from(seconds)
            .map_err(|_| Error::usage(format!("command timeout must not be negative: {seconds}")))?;
        self.timeout = Duration::from_secs(seconds);
        self.timeout_set = true;
        Ok(())
    }

    pub fn prepare_state(&self) -> &PrepareState {
        &self.state
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_prepared()
    }

    /// OID of the row inserted by the last `execute_non_query`, if reported.
    pub fn last_inserted_oid(&self) -> Option<Oid> {
        self.last_inserted_oid
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref().filter(|tx| tx.is_open())
    }

    /// Enlist the command in `transaction`, or in none.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the command is attached to a
    /// different session than the transaction.
    pub fn set_transaction(&mut self, transaction: Option<&Transaction>) -> Result<()> {
        if let (Some(tx), Some(id)) = (transaction, self.session_id)
            && tx.session_id() != id
        {
            return Err(Error::usage("transaction belongs to a different session"));
        }
        self.transaction = transaction.cloned();
        Ok(())
    }

    /// Attach the command to `session`.
    ///
    /// Plans are per session, so a prepared command goes back to
    /// NeedsPrepare. The enlisted transaction, if it has ended, is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the command is enlisted in an open
    /// transaction on another session.
    pub fn set_session<S: Session>(&mut self, session: &S) -> Result<()> {
        if self.session_id == Some(session.session_id()) {
            return Ok(());
        }
        if self.transaction().is_some() {
            return Err(Error::usage(
                "cannot move a command enlisted in an open transaction to another session",
            ));
        }
        self.transaction = None;
        self.attach(session);
        Ok(())
    }

    fn attach<S: Session>(&mut self, session: &S) {
        self.session_id = Some(session.session_id());
        if !self.timeout_set {
            self.timeout = session.default_command_timeout();
        }
        if self.state.is_prepared() {
            self.state.unprepare();
        } else if matches!(self.state, PrepareState::NotPrepared) && session.always_prepare() {
            self.state = PrepareState::NeedsPrepare;
        }
        tracing::debug!(
            session = session.session_id(),
            state = self.state.name(),
            "command attached"
        );
    }

    fn check_session<S: Session>(&mut self, session: &S) -> Result<()> {
        if session.is_broken() {
            return Err(Error::ConnectionBroken);
        }
        self.set_session(session)
    }

    fn call_shape<S: Session>(&self, session: &S, column_list: bool) -> CallShape {
        CallShape {
            select_star: session.protocol_version().supports_set_returning_calls(),
            column_list,
        }
    }

    /// Prepare the command on the server.
    ///
    /// Does nothing if the session does not support prepared statements.
    /// An existing plan is replaced. On failure the command keeps running
    /// unprepared.
    pub fn prepare<S: Session>(&mut self, session: &mut S) -> Result<()> {
        self.check_session(session)?;
        if !session.supports_prepare() {
            return Ok(());
        }
        self.state.unprepare();
        self.prepare_internal(session)
    }

    fn prepare_internal<S: Session>(&mut self, session: &mut S) -> Result<()> {
        if !session.supports_prepare() {
            return Ok(());
        }
        let plan_name = session.next_plan_name();
        let call = self.call_shape(session, false);
        let rewriter = Rewriter::new(&self.parameters, session.encode_options());

        match session.protocol_version() {
            ProtocolVersion::V2 => {
                let text = rewriter.command_text(
                    &self.text,
                    self.command_type,
                    Mode::PrepareAs(&plan_name),
                    call,
                )?;
                send_simple(session, &text, self.timeout)?.discard()?;
                self.state = PrepareState::V2Prepared { plan_name };
            }
            ProtocolVersion::V3 => {
                let text =
                    rewriter.command_text(&self.text, self.command_type, Mode::Placeholders, call)?;
                begin_exchange(session, self.timeout)?;
                let blocker = session.block_notifications();
                guard(session, |s| {
                    s.send_parse(&plan_name, &text, &[])?;
                    s.send_describe(DescribeTarget::Statement, &plan_name)?;
                    s.send_sync()?;
                    s.flush()
                })?;

                // keep the row description, drop everything else
                let mut description = None;
                let mut failure = None;
                for response in session.drain_responses(blocker) {
                    match response {
                        Ok(Response::RowDescription(desc)) => description = Some(desc),
                        Ok(_) => {}
                        Err(e) => {
                            failure.get_or_insert(e);
                        }
                    }
                }
                if let Some(e) = failure {
                    return Err(e);
                }
                let plan = PreparedPlan::new(plan_name, description.as_deref());
                self.state = PrepareState::V3Prepared(Box::new(plan));
            }
        }
        tracing::debug!(
            plan = self.state.plan_name(),
            state = self.state.name(),
            "prepared"
        );
        Ok(())
    }

    /// Whether the called function needs a column definition list.
    fn column_list_needed<S: Session>(&mut self, session: &mut S) -> Result<bool> {
        if let Some(known) = self.needs_column_list {
            return Ok(known);
        }
        let needed = function::needs_column_list(session, &self.text, &self.parameters)?;
        self.needs_column_list = Some(needed);
        Ok(needed)
    }

    /// Full command text with parameter values inlined.
    fn inline_text<S: Session>(&mut self, session: &mut S) -> Result<Vec<u8>> {
        // runs its own exchange, so it must happen before ours takes the gate
        let column_list = match self.command_type {
            CommandType::StoredProcedure => self.column_list_needed(session)?,
            _ => false,
        };
        let call = self.call_shape(session, column_list);
        Rewriter::new(&self.parameters, session.encode_options()).command_text(
            &self.text,
            self.command_type,
            Mode::Inline,
            call,
        )
    }

    fn flow<S: Session>(&mut self, session: &mut S) -> Result<Flow> {
        match &self.state {
            PrepareState::V3Prepared(_) => Ok(Flow::Extended),
            PrepareState::V2Prepared { plan_name } => {
                let rewriter = Rewriter::new(&self.parameters, session.encode_options());
                Ok(Flow::Simple(rewriter.execute_text(plan_name)?))
            }
            PrepareState::NotPrepared | PrepareState::NeedsPrepare => {
                Ok(Flow::Simple(self.inline_text(session)?))
            }
        }
    }

    fn execute_prepared<'s, S: Session>(&mut self, session: &'s mut S) -> Result<Reader<'s, S>> {
        let PrepareState::V3Prepared(plan) = &mut self.state else {
            return Err(Error::Protocol("extended execution without a plan".into()));
        };
        bind_parameters(&mut plan.bind, &mut self.parameters, &session.encode_options())?;

        let describe = !plan.portal_described;
        begin_exchange(session, self.timeout)?;
        let blocker = session.block_notifications();
        guard(session, |s| {
            s.send_bind(&plan.bind)?;
            if describe {
                s.send_describe(DescribeTarget::Portal, &plan.bind.portal)?;
            }
            s.send_execute(&plan.execute)?;
            s.send_sync()?;
            s.flush()
        })?;

        let cached = if describe {
            None
        } else {
            plan.row_description.clone()
        };
        let reader = Reader::new(session.drain_responses(blocker), cached)?;
        if describe {
            plan.portal_described = true;
            plan.row_description = reader.current_description().cloned();
        }
        Ok(reader)
    }

    /// Replace a result of refcursors with the rows of every cursor.
    fn expand_refcursors<'s, S: Session>(&self, mut reader: Reader<'s, S>) -> Result<Reader<'s, S>> {
        let text = function::fetch_all_text(&mut reader)?;
        let session = reader.into_session();
        tracing::debug!(query = %text.trim_end(), "fetching refcursors");
        let stream = send_simple(session, text.as_bytes(), self.timeout)?;
        Reader::new(stream, None)
    }

    /// Execute and return a reader over the results.
    ///
    /// The reader borrows the session: no other command can run on it
    /// until the reader is dropped.
    pub fn execute_reader<'s, S: Session>(&mut self, session: &'s mut S) -> Result<Reader<'s, S>> {
        self.check_session(session)?;
        if self.state.needs_prepare() {
            self.prepare_internal(session)?;
        }

        let reader = match self.flow(session)? {
            Flow::Simple(text) => {
                tracing::debug!(state = self.state.name(), "simple execution");
                Reader::new(send_simple(session, &text, self.timeout)?, None)?
            }
            Flow::Extended => {
                tracing::debug!(plan = self.state.plan_name(), "extended execution");
                self.execute_prepared(session)?
            }
        };

        if self.command_type == CommandType::StoredProcedure && function::is_refcursor_result(&reader)
        {
            return self.expand_refcursors(reader);
        }
        Ok(reader)
    }

    /// Execute and return the number of rows affected.
    ///
    /// Counts are summed over every statement; `None` if no statement
    /// reported one.
    pub fn execute_non_query<S: Session>(&mut self, session: &mut S) -> Result<Option<u64>> {
        let mut reader = self.execute_reader(session)?;
        reader.drain()?;
        if let Some(oid) = reader.last_inserted_oid() {
            self.last_inserted_oid = Some(oid);
        }
        Ok(reader.rows_affected())
    }

    /// Execute and return the first column of the first row, if any.
    pub fn execute_scalar<S: Session>(&mut self, session: &mut S) -> Result<Option<Value>> {
        let mut reader = self.execute_reader(session)?;
        let value = if reader.read()? && reader.field_count() > 0 {
            Some(reader.get::<Value>(0)?)
        } else {
            None
        };
        reader.drain()?;
        Ok(value)
    }

    /// Execute through the simple protocol and discard every response.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the command is prepared, or after
    /// the fact if the statement returned rows.
    pub fn execute_blind<S: Session>(&mut self, session: &mut S) -> Result<()> {
        if self.state.is_prepared() {
            return Err(Error::usage("cannot execute a prepared command blindly"));
        }
        self.check_session(session)?;
        let text = self.inline_text(session)?;

        let mut returned_rows = false;
        let mut failure = None;
        for response in send_simple(session, &text, self.timeout)? {
            match response {
                Ok(Response::RowDescription(_) | Response::DataRow(_)) => returned_rows = true,
                Ok(_) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if returned_rows {
            return Err(Error::usage("blind execution of a statement that returns rows"));
        }
        Ok(())
    }

    /// Ask the server to cancel whatever runs on the token's session.
    ///
    /// Never fails. A transport fault on the cancel channel invalidates the
    /// session; any other failure is ignored.
    #[cfg(feature = "sync")]
    pub fn cancel(&self, token: &crate::sync::CancelToken) {
        match token.send() {
            Ok(()) => {}
            Err(e) if e.is_connection_broken() => {
                tracing::warn!(error = %e, "cancel request failed, invalidating session");
                token.invalidate_session();
            }
            Err(e) => tracing::debug!(error = %e, "cancel request failed"),
        }
    }
}

impl Clone for Command {
    /// An unprepared copy with the same text, type, timeout and parameters.
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            command_type: self.command_type,
            parameters: self.parameters.unbound_clone(),
            timeout: self.timeout,
            timeout_set: self.timeout_set,
            state: PrepareState::NotPrepared,
            session_id: self.session_id,
            transaction: self.transaction.clone(),
            needs_column_list: None,
            last_inserted_oid: None,
        }
    }
}
