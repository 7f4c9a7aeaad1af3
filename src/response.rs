//! Owned backend responses and the forward-only response sequence.

use std::sync::Arc;

use crate::error::{Error, ErrorFields, Result};
use crate::protocol::RawMessage;
use crate::protocol::backend::{
    self, CommandComplete, ErrorResponse, FieldDescriptionTail, ParameterDescription,
    ReadyForQuery, msg_type,
};
use crate::protocol::backend::query::{tag_inserted_oid, tag_rows_affected};
use crate::protocol::types::{FormatCode, Oid, TransactionStatus};
use crate::session::{NotificationBlocker, Session};

/// Column information from RowDescription.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub tail: FieldDescriptionTail,
}

impl ColumnInfo {
    /// Table OID (0 if not a table column)
    pub fn table_oid(&self) -> Oid {
        self.tail.table_oid.get()
    }

    /// Data type OID
    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid()
    }

    /// Type modifier (type-specific)
    pub fn type_modifier(&self) -> i32 {
        self.tail.type_modifier()
    }

    /// Format code the column values are sent in
    pub fn format(&self) -> FormatCode {
        self.tail.format()
    }
}

/// Owned row description, shareable between a prepared plan and its readers.
#[derive(Debug, Clone, Default)]
pub struct RowDescription {
    columns: Vec<ColumnInfo>,
}

impl RowDescription {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let parsed = backend::RowDescription::parse(payload)?;
        Ok(Self {
            columns: parsed
                .fields()
                .iter()
                .map(|f| ColumnInfo {
                    name: f.name.to_string(),
                    tail: *f.tail,
                })
                .collect(),
        })
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Owned DataRow payload.
#[derive(Debug, Clone)]
pub struct DataRow {
    payload: Vec<u8>,
}

impl DataRow {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        backend::DataRow::parse(payload)?;
        Ok(Self {
            payload: payload.to_vec(),
        })
    }

    fn view(&self) -> Option<backend::DataRow<'_>> {
        backend::DataRow::parse(&self.payload).ok()
    }

    pub fn len(&self) -> usize {
        self.view().map_or(0, |row| row.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column value; the inner `None` is SQL NULL.
    pub fn get(&self, index: usize) -> Option<Option<&[u8]>> {
        self.view()?.get(index)
    }
}

/// Command completion tag, e.g. `INSERT 0 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTag(pub String);

impl CommandTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Row count reported by the tag, if the command reports one.
    pub fn rows_affected(&self) -> Option<u64> {
        tag_rows_affected(&self.0)
    }

    /// OID of a single inserted row, if the server reported one.
    pub fn inserted_oid(&self) -> Option<Oid> {
        tag_inserted_oid(&self.0)
    }
}

/// One backend response belonging to a command exchange.
///
/// Asynchronous messages (notices, notifications, parameter status) never
/// appear here; the session consumes them.
#[derive(Debug, Clone)]
pub enum Response {
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    ParameterDescription(Vec<Oid>),
    RowDescription(Arc<RowDescription>),
    DataRow(DataRow),
    CommandComplete(CommandTag),
    EmptyQuery,
    PortalSuspended,
    Error(ErrorFields),
    ReadyForQuery(TransactionStatus),
}

impl Response {
    /// Decode a non-asynchronous backend message.
    pub fn parse(msg: RawMessage<'_>) -> Result<Self> {
        let payload = msg.payload;
        Ok(match msg.type_byte {
            msg_type::PARSE_COMPLETE => Response::ParseComplete,
            msg_type::BIND_COMPLETE => Response::BindComplete,
            msg_type::CLOSE_COMPLETE => Response::CloseComplete,
            msg_type::NO_DATA => Response::NoData,
            msg_type::PARAMETER_DESCRIPTION => {
                Response::ParameterDescription(ParameterDescription::parse(payload)?.into_oids())
            }
            msg_type::ROW_DESCRIPTION => {
                Response::RowDescription(Arc::new(RowDescription::parse(payload)?))
            }
            msg_type::DATA_ROW => Response::DataRow(DataRow::parse(payload)?),
            msg_type::COMMAND_COMPLETE => {
                Response::CommandComplete(CommandTag(CommandComplete::parse(payload)?.tag.to_string()))
            }
            msg_type::EMPTY_QUERY_RESPONSE => Response::EmptyQuery,
            msg_type::PORTAL_SUSPENDED => Response::PortalSuspended,
            msg_type::ERROR_RESPONSE => Response::Error(ErrorResponse::parse(payload)?.fields),
            msg_type::READY_FOR_QUERY => Response::ReadyForQuery(ReadyForQuery::parse(payload)?.status),
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected backend message '{}'",
                    other as char
                )));
            }
        })
    }
}

/// Forward-only sequence of the responses to one exchange.
///
/// Ends at ReadyForQuery, which is not yielded. A server error is yielded
/// once, after the rest of the exchange has been drained, and ends the
/// sequence. While the stream exists it holds the session's notification
/// gate and borrows the session, so no other exchange can start.
pub struct ResponseStream<'s, S: Session> {
    session: &'s mut S,
    _blocker: NotificationBlocker,
    done: bool,
}

impl<'s, S: Session> ResponseStream<'s, S> {
    pub fn new(session: &'s mut S, blocker: NotificationBlocker) -> Self {
        Self {
            session,
            _blocker: blocker,
            done: false,
        }
    }

    /// Whether ReadyForQuery (or a fault) has been reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn session(&self) -> &S {
        self.session
    }

    /// Consume every remaining response, returning the first server error.
    pub fn discard(&mut self) -> Result<()> {
        let mut first_error = None;
        for response in self.by_ref() {
            if let Err(e) = response {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Give the session back, releasing the notification gate.
    ///
    /// Unread responses stay pending on the session and are dropped by the
    /// next exchange's reset.
    pub fn into_session(self) -> &'s mut S {
        let ResponseStream { session, .. } = self;
        session
    }

    fn drain_after_error(&mut self) -> Result<()> {
        loop {
            match self.session.read_response() {
                Ok(Response::ReadyForQuery(_)) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    if e.is_connection_broken() {
                        self.session.mark_broken();
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl<S: Session> Iterator for ResponseStream<'_, S> {
    type Item = Result<Response>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.read_response() {
            Ok(Response::ReadyForQuery(_)) => {
                self.done = true;
                None
            }
            Ok(Response::Error(fields)) => {
                self.done = true;
                tracing::debug!(code = ?fields.code, "server error in response sequence");
                if let Err(e) = self.drain_after_error() {
                    return Some(Err(e));
                }
                Some(Err(Error::Server(fields)))
            }
            Ok(response) => Some(Ok(response)),
            Err(e) => {
                self.done = true;
                if e.is_connection_broken() {
                    self.session.mark_broken();
                }
                Some(Err(e))
            }
        }
    }
}
