//! Backend type descriptors and parameter encoding.
//!
//! A [`TypeCodec`] knows how to turn a [`Value`] into the bytes the backend
//! expects, either as an inline SQL literal (simple protocol, `EXECUTE` text)
//! or as a Bind value in the type's preferred wire format.

mod builtin;
mod literal;

pub use builtin::PgType;
pub use literal::{quote_string, sql_literal};

use crate::error::Result;
use crate::protocol::types::{FormatCode, Oid};
use crate::value::Value;

/// Session-dependent encoding switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// When false, backslashes in string literals are escapes and literals
    /// containing them are emitted in `E'...'` form.
    pub standard_conforming_strings: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            standard_conforming_strings: true,
        }
    }
}

/// Per-type value encoder used by the parameter rewriter and binder.
pub trait TypeCodec: std::fmt::Debug + Send + Sync {
    /// Backend type name (`pg_type.typname`).
    fn name(&self) -> &str;

    /// Backend type OID.
    fn oid(&self) -> Oid;

    /// Name used after `::` when the parameter requests an explicit cast.
    fn cast_name(&self) -> &str {
        self.name()
    }

    /// Whether Bind values of this type are sent in binary format.
    fn supports_binary(&self) -> bool;

    /// Whether the parameter size is appended to the cast, as in `varchar(20)`.
    fn uses_size(&self) -> bool {
        false
    }

    /// Encode a non-null value.
    ///
    /// With `for_extended` the result is a Bind value in
    /// [`TypeCodec::bind_format`]; otherwise it is an SQL literal that can be
    /// spliced into command text.
    fn encode(&self, value: &Value, for_extended: bool, options: &EncodeOptions) -> Result<Vec<u8>>;

    /// Bind format used for non-null values of this type.
    fn bind_format(&self) -> FormatCode {
        FormatCode::preferring_binary(self.supports_binary())
    }
}
