//! Scripted transport and message builders shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use zero_pgcommand::SessionOpts;
use zero_pgcommand::sync::{Transport, WireSession};

#[derive(Default)]
struct Script {
    input: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
    timeouts: Vec<Option<Duration>>,
}

/// Transport replaying canned backend bytes and recording what is written.
///
/// Clones share the script, so a test keeps one handle while the session
/// owns the other.
#[derive(Clone, Default)]
pub struct ScriptedStream {
    script: Rc<RefCell<Script>>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue backend messages for the next reads.
    pub fn reply(&self, messages: &[Vec<u8>]) {
        let mut script = self.script.borrow_mut();
        for message in messages {
            script.input.extend(message);
        }
    }

    pub fn fail_writes(&self) {
        self.script.borrow_mut().fail_writes = true;
    }

    /// Frontend messages written since the last call.
    pub fn take_sent(&self) -> Vec<Sent> {
        let bytes = std::mem::take(&mut self.script.borrow_mut().written);
        decode_frontend(&bytes)
    }

    pub fn unread(&self) -> usize {
        self.script.borrow().input.len()
    }

    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.script.borrow().timeouts.clone()
    }
}

impl Transport for ScriptedStream {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut script = self.script.borrow_mut();
        let n = buf.len();
        if script.input.len() < n {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"));
        }
        for (dst, src) in buf.iter_mut().zip(script.input.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut script = self.script.borrow_mut();
        if script.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
        }
        script.written.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.script.borrow_mut().timeouts.push(timeout);
        Ok(())
    }
}

pub fn session(opts: SessionOpts) -> (WireSession<ScriptedStream>, ScriptedStream) {
    let stream = ScriptedStream::new();
    (WireSession::new(stream.clone(), opts), stream)
}

pub fn default_session() -> (WireSession<ScriptedStream>, ScriptedStream) {
    session(SessionOpts::default())
}

/// A decoded frontend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl Sent {
    /// Text of a Query message.
    pub fn query(&self) -> Option<String> {
        (self.tag == b'Q').then(|| cstr(&self.body))
    }

    /// Values of a Bind message.
    pub fn bind_values(&self) -> Option<Vec<Option<Vec<u8>>>> {
        if self.tag != b'B' {
            return None;
        }
        let body = &self.body;
        let mut pos = 0;
        // portal and statement names
        for _ in 0..2 {
            pos += body[pos..].iter().position(|&b| b == 0).unwrap_or(0) + 1;
        }
        let read_i16 = |at: usize| i16::from_be_bytes([body[at], body[at + 1]]) as usize;
        let formats = read_i16(pos);
        pos += 2 + formats * 2;
        let count = read_i16(pos);
        pos += 2;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = i32::from_be_bytes([body[pos], body[pos + 1], body[pos + 2], body[pos + 3]]);
            pos += 4;
            if len < 0 {
                values.push(None);
            } else {
                let len = len as usize;
                values.push(Some(body[pos..pos + len].to_vec()));
                pos += len;
            }
        }
        Some(values)
    }

    /// Statement or portal name of a Parse or Describe message.
    pub fn name(&self) -> String {
        match self.tag {
            b'D' => cstr(&self.body[1..]),
            _ => cstr(&self.body),
        }
    }
}

/// NUL-terminated string at the start of `bytes`.
fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn decode_frontend(mut bytes: &[u8]) -> Vec<Sent> {
    let mut out = Vec::new();
    while bytes.len() >= 5 {
        let tag = bytes[0];
        let len = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        out.push(Sent {
            tag,
            body: bytes[5..1 + len].to_vec(),
        });
        bytes = &bytes[1 + len..];
    }
    out
}

pub fn queries(sent: &[Sent]) -> Vec<String> {
    sent.iter().filter_map(Sent::query).collect()
}

pub fn tags(sent: &[Sent]) -> String {
    sent.iter().map(|m| m.tag as char).collect()
}

/// Backend message builders.
pub mod backend {
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const BOOL: u32 = 16;
    pub const REFCURSOR: u32 = 1790;

    fn message(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn push_cstr(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }

    /// RowDescription with text-format columns.
    pub fn row_description(columns: &[(&str, u32)]) -> Vec<u8> {
        row_description_with_format(columns, 0)
    }

    pub fn row_description_with_format(columns: &[(&str, u32)], format: i16) -> Vec<u8> {
        let mut body = (columns.len() as i16).to_be_bytes().to_vec();
        for (name, type_oid) in columns {
            push_cstr(&mut body, name);
            body.extend_from_slice(&0u32.to_be_bytes());
            body.extend_from_slice(&0i16.to_be_bytes());
            body.extend_from_slice(&type_oid.to_be_bytes());
            body.extend_from_slice(&(-1i16).to_be_bytes());
            body.extend_from_slice(&(-1i32).to_be_bytes());
            body.extend_from_slice(&format.to_be_bytes());
        }
        message(b'T', &body)
    }

    pub fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
        let mut body = (values.len() as i16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(bytes) => {
                    body.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    body.extend_from_slice(bytes);
                }
                None => body.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        message(b'D', &body)
    }

    /// DataRow of text values.
    pub fn text_row(values: &[&str]) -> Vec<u8> {
        let values: Vec<Option<&[u8]>> = values.iter().map(|v| Some(v.as_bytes())).collect();
        data_row(&values)
    }

    pub fn command_complete(tag: &str) -> Vec<u8> {
        let mut body = Vec::new();
        push_cstr(&mut body, tag);
        message(b'C', &body)
    }

    pub fn ready(status: u8) -> Vec<u8> {
        message(b'Z', &[status])
    }

    pub fn error(severity: &str, code: &str, text: &str) -> Vec<u8> {
        message(b'E', &fields(severity, code, text))
    }

    pub fn notice(text: &str) -> Vec<u8> {
        message(b'N', &fields("NOTICE", "00000", text))
    }

    fn fields(severity: &str, code: &str, text: &str) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', text)] {
            body.push(field);
            push_cstr(&mut body, value);
        }
        body.push(0);
        body
    }

    pub fn notification(pid: u32, channel: &str, payload: &str) -> Vec<u8> {
        let mut body = pid.to_be_bytes().to_vec();
        push_cstr(&mut body, channel);
        push_cstr(&mut body, payload);
        message(b'A', &body)
    }

    pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
        let mut body = Vec::new();
        push_cstr(&mut body, name);
        push_cstr(&mut body, value);
        message(b'S', &body)
    }

    pub fn empty_query_response() -> Vec<u8> {
        message(b'I', &[])
    }

    pub fn parse_complete() -> Vec<u8> {
        message(b'1', &[])
    }

    pub fn bind_complete() -> Vec<u8> {
        message(b'2', &[])
    }

    pub fn no_data() -> Vec<u8> {
        message(b'n', &[])
    }

    pub fn parameter_description(oids: &[u32]) -> Vec<u8> {
        let mut body = (oids.len() as i16).to_be_bytes().to_vec();
        for oid in oids {
            body.extend_from_slice(&oid.to_be_bytes());
        }
        message(b't', &body)
    }
}
