use super::EncodeOptions;
use crate::value::{Value, bytea_hex};

/// Quote `s` as an SQL string literal.
pub fn quote_string(s: &str, options: &EncodeOptions) -> String {
    let escaped = s.replace('\'', "''");
    if !options.standard_conforming_strings && escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

fn is_plain_number(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty()
        && s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
}

/// Render `value` as an SQL literal that can be spliced into command text.
pub fn sql_literal(value: &Value, options: &EncodeOptions) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => value.to_text(),
        Value::Float32(_) | Value::Float64(_) | Value::Numeric(_) => {
            let text = value.to_text();
            if is_plain_number(&text) {
                text.trim().to_string()
            } else {
                // NaN, Infinity and anything the server must parse itself
                quote_string(&text, options)
            }
        }
        Value::Text(s) => quote_string(s, options),
        Value::Bytes(b) => quote_string(&bytea_hex(b), options),
    }
}
