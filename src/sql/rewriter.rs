//! Resolving parameter markers and building wire-ready command text.

use crate::command::CommandType;
use crate::error::{Error, Result};
use crate::parameter::{Parameter, ParameterSet};
use crate::types::EncodeOptions;

use super::scanner::split_statements;

/// How parameters are rendered into the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode<'a> {
    /// Values are serialized inline as SQL literals.
    Inline,
    /// `$n` placeholders for a Parse message.
    Placeholders,
    /// `$n` placeholders behind a `PREPARE <plan> AS` prefix.
    PrepareAs(&'a str),
}

impl Mode<'_> {
    fn is_prepare(self) -> bool {
        !matches!(self, Mode::Inline)
    }
}

/// Shape of a stored-procedure call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallShape {
    /// `SELECT * FROM f(...)` rather than `SELECT f(...)`.
    pub select_star: bool,
    /// Append an `AS (name type, ...)` column definition list.
    pub column_list: bool,
}

/// Marker-name characters: `[.0-9A-Za-z_]`.
pub fn is_marker_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

#[derive(Clone, Copy)]
enum Scan {
    Plain,
    Quoted { closing: bool },
    /// Saw one `:`; it is either a marker or the first half of `::`.
    Colon,
    Marker { sigil: u8, start: usize },
}

/// Renders command text against one parameter set.
pub struct Rewriter<'a> {
    params: &'a ParameterSet,
    options: EncodeOptions,
}

impl<'a> Rewriter<'a> {
    pub fn new(params: &'a ParameterSet, options: EncodeOptions) -> Self {
        Self { params, options }
    }

    /// Build the full command text for `text` interpreted as `command_type`.
    ///
    /// Statements are joined with `;\r\n`. Multi-statement text is rejected
    /// for any prepare mode and for stored-procedure calls.
    pub fn command_text(
        &self,
        text: &str,
        command_type: CommandType,
        mode: Mode<'_>,
        call: CallShape,
    ) -> Result<Vec<u8>> {
        let fragments = split_statements(text);
        if fragments.len() > 1 && (mode.is_prepare() || command_type == CommandType::StoredProcedure)
        {
            return Err(Error::usage(
                "multiple statements are not supported for this command type",
            ));
        }

        let mut out = Vec::with_capacity(text.len() + 16);
        for fragment in &fragments {
            if !out.is_empty() {
                out.extend_from_slice(b";\r\n");
            }
            if let Mode::PrepareAs(plan) = mode {
                out.extend_from_slice(b"PREPARE ");
                out.extend_from_slice(plan.as_bytes());
                out.extend_from_slice(b" AS ");
            }

            let statement = fragment.text(text);
            match command_type {
                CommandType::Text => self.replace_markers(&mut out, statement, mode.is_prepare())?,
                CommandType::TableDirect => {
                    out.extend_from_slice(b"SELECT * FROM ");
                    out.extend_from_slice(statement.as_bytes());
                }
                CommandType::StoredProcedure => {
                    self.call_text(&mut out, statement, mode.is_prepare(), call)?;
                }
            }
        }
        Ok(out)
    }

    fn call_text(&self, out: &mut Vec<u8>, statement: &str, prepare: bool, call: CallShape) -> Result<()> {
        out.extend_from_slice(if call.select_star {
            b"SELECT * FROM ".as_slice()
        } else {
            b"SELECT ".as_slice()
        });

        if statement.ends_with(')') {
            self.replace_markers(out, statement, prepare)?;
        } else {
            out.extend_from_slice(statement.as_bytes());
            out.push(b'(');
            let inputs = self
                .params
                .iter()
                .enumerate()
                .filter(|(_, p)| p.direction().is_input());
            for (n, (index, param)) in inputs.enumerate() {
                if n > 0 {
                    out.extend_from_slice(b", ");
                }
                if prepare {
                    append_placeholder(out, param, index + 1);
                } else {
                    self.append_value(out, param)?;
                }
            }
            out.push(b')');
        }

        if !prepare && call.column_list {
            self.append_column_list(out);
        }
        Ok(())
    }

    /// `EXECUTE <plan>((v1)::cast,(v2))` for a statement prepared with `PREPARE`.
    pub fn execute_text(&self, plan_name: &str) -> Result<Vec<u8>> {
        let mut out = format!("EXECUTE {plan_name}").into_bytes();
        if !self.params.is_empty() {
            out.push(b'(');
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.push(b'(');
                out.extend_from_slice(&self.literal(param)?);
                out.push(b')');
                append_cast(&mut out, param);
            }
            out.push(b')');
        }
        Ok(out)
    }

    /// Copy `fragment` to `out`, substituting markers that name a parameter.
    ///
    /// `@name` and `:name` are markers; `::` is the cast operator and is kept.
    /// Markers inside literals and markers naming no parameter are copied
    /// verbatim. Output-only parameters contribute nothing.
    pub fn replace_markers(&self, out: &mut Vec<u8>, fragment: &str, prepare: bool) -> Result<()> {
        let bytes = fragment.as_bytes();
        let mut state = Scan::Plain;
        let mut pos = 0;

        while let Some(&b) = bytes.get(pos) {
            match state {
                Scan::Plain => match b {
                    b'\'' => {
                        out.push(b);
                        state = Scan::Quoted { closing: false };
                    }
                    b'@' => {
                        state = Scan::Marker {
                            sigil: b,
                            start: pos + 1,
                        }
                    }
                    b':' => state = Scan::Colon,
                    _ => out.push(b),
                },
                Scan::Quoted { closing } => {
                    if b == b'\'' {
                        state = Scan::Quoted { closing: !closing };
                    } else if closing {
                        state = Scan::Plain;
                        continue;
                    }
                    out.push(b);
                }
                Scan::Colon => {
                    if b == b':' {
                        out.extend_from_slice(b"::");
                        state = Scan::Plain;
                    } else {
                        state = Scan::Marker {
                            sigil: b':',
                            start: pos,
                        };
                        continue;
                    }
                }
                Scan::Marker { sigil, start } => {
                    if !is_marker_char(b) {
                        self.resolve_marker(out, sigil, bytes.get(start..pos).unwrap_or_default(), prepare)?;
                        state = Scan::Plain;
                        continue;
                    }
                }
            }
            pos += 1;
        }

        match state {
            Scan::Colon => out.push(b':'),
            Scan::Marker { sigil, start } => {
                self.resolve_marker(out, sigil, bytes.get(start..).unwrap_or_default(), prepare)?;
            }
            Scan::Plain | Scan::Quoted { .. } => {}
        }
        Ok(())
    }

    fn resolve_marker(&self, out: &mut Vec<u8>, sigil: u8, name: &[u8], prepare: bool) -> Result<()> {
        // marker characters are ASCII
        let name = std::str::from_utf8(name).unwrap_or_default();
        let found = self
            .params
            .position(name)
            .and_then(|i| self.params.at(i).map(|p| (i, p)));
        match found {
            Some((index, param)) => {
                if param.direction().is_input() {
                    if prepare {
                        append_placeholder(out, param, index + 1);
                    } else {
                        self.append_value(out, param)?;
                    }
                }
            }
            None => {
                out.push(sigil);
                out.extend_from_slice(name.as_bytes());
            }
        }
        Ok(())
    }

    fn literal(&self, param: &Parameter) -> Result<Vec<u8>> {
        param.codec().encode(param.value(), false, &self.options)
    }

    /// `((literal)::cast(size))`. The inner parentheses keep negative
    /// minimum values intact under the cast.
    fn append_value(&self, out: &mut Vec<u8>, param: &Parameter) -> Result<()> {
        out.extend_from_slice(b"((");
        out.extend_from_slice(&self.literal(param)?);
        out.push(b')');
        append_cast(out, param);
        out.push(b')');
        Ok(())
    }

    /// ` AS (name type, ...)` from output parameters.
    fn append_column_list(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b" AS (");
        let columns = self.params.iter().filter(|p| p.direction().is_output());
        for (n, param) in columns.enumerate() {
            if n > 0 {
                out.extend_from_slice(b", ");
            }
            out.extend_from_slice(param.name().as_bytes());
            out.push(b' ');
            out.extend_from_slice(param.codec().name().as_bytes());
        }
        out.push(b')');
    }
}

fn append_cast(out: &mut Vec<u8>, param: &Parameter) {
    if param.use_cast() {
        out.extend_from_slice(b"::");
        out.extend_from_slice(param.codec().cast_name().as_bytes());
        if let Some(size) = param.size_suffix() {
            out.extend_from_slice(size.as_bytes());
        }
    }
}

/// `($n::cast(size))`, or `($n)` without a cast.
fn append_placeholder(out: &mut Vec<u8>, param: &Parameter, ordinal: usize) {
    out.extend_from_slice(format!("(${ordinal}").as_bytes());
    append_cast(out, param);
    out.push(b')');
}
