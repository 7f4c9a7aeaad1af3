//! Reusable Bind/Execute templates and incremental parameter binding.

use crate::error::Result;
use crate::parameter::ParameterSet;
use crate::protocol::types::FormatCode;
use crate::types::EncodeOptions;

/// Bind message kept alive across executions of a prepared command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMessage {
    pub portal: String,
    pub statement: String,
    pub param_formats: Vec<FormatCode>,
    /// Encoded parameter values; `None` is NULL.
    pub values: Vec<Option<Vec<u8>>>,
    pub result_formats: Vec<FormatCode>,
}

impl BindMessage {
    /// Template binding the unnamed portal to `statement`, with no values yet.
    pub fn new(statement: &str, result_formats: Vec<FormatCode>) -> Self {
        Self {
            portal: String::new(),
            statement: statement.to_string(),
            param_formats: Vec::new(),
            values: Vec::new(),
            result_formats,
        }
    }
}

/// Execute message template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecuteMessage {
    pub portal: String,
    /// 0 = all rows
    pub max_rows: u32,
}

/// Bring `bind`'s values and format codes up to date with `params`.
///
/// If the template's arrays do not match the parameter count every value is
/// re-encoded; otherwise only parameters whose `bound` flag is clear are.
/// NULL always goes out with the binary format code. Returns the number of
/// parameters encoded.
pub fn bind_parameters(
    bind: &mut BindMessage,
    params: &mut ParameterSet,
    options: &EncodeOptions,
) -> Result<usize> {
    let count = params.len();
    let rebuild = bind.values.len() != count || bind.param_formats.len() != count;
    if rebuild {
        bind.values = vec![None; count];
        bind.param_formats = vec![FormatCode::Text; count];
    }

    let mut encoded = 0;
    let slots = bind.values.iter_mut().zip(bind.param_formats.iter_mut());
    for (param, (value, format)) in params.iter_mut().zip(slots) {
        if !rebuild && param.is_bound() {
            continue;
        }
        if param.value().is_null() {
            *value = None;
            *format = FormatCode::Binary;
        } else {
            let codec = param.codec();
            *value = Some(codec.encode(param.value(), true, options)?);
            *format = codec.bind_format();
        }
        param.mark_bound();
        encoded += 1;
    }
    tracing::trace!(encoded, total = count, rebuild, "bound parameters");
    Ok(encoded)
}
