//! Forward-only reader over a command's response sequence.

use std::sync::Arc;

use crate::conversion::FromWireValue;
use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};
use crate::response::{CommandTag, DataRow, Response, ResponseStream, RowDescription};
use crate::session::Session;

/// Reads the results of one execution.
///
/// A result is a row set: a RowDescription (or the cached description of a
/// prepared plan) followed by DataRows and a CommandComplete. Commands that
/// return no rows only contribute to [`Reader::rows_affected`]. The reader
/// is positioned on the first result as soon as it is created.
pub struct Reader<'s, S: Session> {
    stream: ResponseStream<'s, S>,
    /// Description to assume for rows that arrive without one.
    cached: Option<Arc<RowDescription>>,
    description: Option<Arc<RowDescription>>,
    pending: Option<DataRow>,
    row: Option<DataRow>,
    in_rows: bool,
    rows_affected: Option<u64>,
    last_inserted_oid: Option<Oid>,
}

impl<'s, S: Session> Reader<'s, S> {
    pub fn new(stream: ResponseStream<'s, S>, cached: Option<Arc<RowDescription>>) -> Result<Self> {
        let mut reader = Self {
            stream,
            cached,
            description: None,
            pending: None,
            row: None,
            in_rows: false,
            rows_affected: None,
            last_inserted_oid: None,
        };
        reader.seek_result()?;
        Ok(reader)
    }

    fn next_response(&mut self) -> Result<Option<Response>> {
        self.stream.next().transpose()
    }

    fn record(&mut self, tag: &CommandTag) {
        if let Some(n) = tag.rows_affected() {
            self.rows_affected = Some(self.rows_affected.unwrap_or(0) + n);
        }
        if let Some(oid) = tag.inserted_oid() {
            self.last_inserted_oid = Some(oid);
        }
    }

    /// Move to the next row set, skipping completions of row-less commands.
    fn seek_result(&mut self) -> Result<()> {
        self.description = None;
        self.row = None;
        self.in_rows = false;
        while let Some(response) = self.next_response()? {
            match response {
                Response::RowDescription(desc) => {
                    self.description = Some(desc);
                    self.in_rows = true;
                    return Ok(());
                }
                Response::DataRow(row) => {
                    let desc = self.cached.take().ok_or_else(|| {
                        Error::Protocol("DataRow without RowDescription".into())
                    })?;
                    self.description = Some(desc);
                    self.pending = Some(row);
                    self.in_rows = true;
                    return Ok(());
                }
                Response::CommandComplete(tag) => {
                    self.record(&tag);
                    if let Some(desc) = self.cached.take() {
                        // prepared query that returned no rows
                        self.description = Some(desc);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Advance to the next row of the current result.
    pub fn read(&mut self) -> Result<bool> {
        self.row = None;
        if !self.in_rows {
            return Ok(false);
        }
        if let Some(row) = self.pending.take() {
            self.row = Some(row);
            return Ok(true);
        }
        loop {
            match self.next_response()? {
                Some(Response::DataRow(row)) => {
                    self.row = Some(row);
                    return Ok(true);
                }
                Some(Response::CommandComplete(tag)) => {
                    self.record(&tag);
                    break;
                }
                Some(Response::PortalSuspended) | None => break,
                Some(_) => {}
            }
        }
        self.in_rows = false;
        Ok(false)
    }

    /// Skip the rest of the current result and move to the next one.
    pub fn next_result(&mut self) -> Result<bool> {
        while self.read()? {}
        self.seek_result()?;
        Ok(self.description.is_some())
    }

    /// Consume everything that is left, keeping the affected-row counts.
    pub fn drain(&mut self) -> Result<()> {
        while self.next_result()? {}
        Ok(())
    }

    /// Description of the current result, if positioned on one.
    pub fn current_description(&self) -> Option<&Arc<RowDescription>> {
        self.description.as_ref()
    }

    pub fn field_count(&self) -> usize {
        self.description.as_ref().map_or(0, |d| d.len())
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        let column = self.description.as_ref()?.columns().get(index)?;
        Some(&column.name)
    }

    /// Backend type name of a column, looked up in the session's catalog.
    pub fn data_type_name(&self, index: usize) -> Option<String> {
        let column = self.description.as_ref()?.columns().get(index)?;
        self.stream.session().type_name(column.type_oid())
    }

    /// Decode a column of the current row.
    pub fn get<'r, T: FromWireValue<'r>>(&'r self, index: usize) -> Result<T> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| Error::usage("no current row; call read() first"))?;
        let column = self
            .description
            .as_ref()
            .and_then(|d| d.columns().get(index))
            .ok_or_else(|| Error::usage(format!("column index {index} out of range")))?;
        let value = row
            .get(index)
            .ok_or_else(|| Error::Protocol(format!("DataRow has no column {index}")))?;
        let format: FormatCode = column.format();
        T::decode(column.type_oid(), format, value)
    }

    /// Sum of the row counts reported so far; `None` if no command reported one.
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    pub fn last_inserted_oid(&self) -> Option<Oid> {
        self.last_inserted_oid
    }

    pub fn session(&self) -> &S {
        self.stream.session()
    }

    /// Release the reader and hand the session back.
    pub fn into_session(self) -> &'s mut S {
        self.stream.into_session()
    }
}
