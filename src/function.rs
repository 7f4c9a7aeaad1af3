//! Follow-up work for stored-procedure calls.
//!
//! Two cases need extra round trips: functions returning an untyped
//! `record`, which need an `AS (...)` column definition list built from the
//! output parameters, and functions returning a single refcursor column,
//! whose cursors are fetched transparently.

use crate::command::Command;
use crate::error::Result;
use crate::parameter::{Parameter, ParameterSet};
use crate::reader::Reader;
use crate::session::Session;
use crate::types::PgType;
use crate::value::Value;

const RETURNS_RECORD_PREDICATE: &str = "prorettype = ( select oid from pg_type where typname = 'record' ) \
     and proargtypes=:proargtypes and proname=:proname \
     and ('o' = any (proargmodes) OR 'b' = any (proargmodes) OR 't' = any (proargmodes)) is not true";

/// Lower-case an identifier unless it is quoted.
fn fold_identifier(name: &str) -> String {
    let name = name.trim();
    if name.contains('"') {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Split call text into an optional schema and the function name.
fn procedure_name(text: &str) -> (Option<String>, String) {
    let name = text.split_once('(').map_or(text, |(name, _)| name).trim();
    match name.split('.').collect::<Vec<_>>().as_slice() {
        [schema, function] => (Some(fold_identifier(schema)), fold_identifier(function)),
        _ => (None, fold_identifier(name)),
    }
}

/// Build the catalog lookup that decides whether `text` names a function
/// returning an untyped record. `None` when no parameter could describe the
/// result columns.
pub(crate) fn returns_record_query<S: Session>(
    session: &S,
    text: &str,
    params: &ParameterSet,
) -> Option<Command> {
    if !params.iter().any(|p| p.direction().is_output()) {
        return None;
    }

    let mut arg_types = String::new();
    for param in params.iter().filter(|p| p.direction().is_input()) {
        let codec = param.codec();
        let type_oid = session.type_oid(codec.name()).unwrap_or(codec.oid());
        arg_types.push_str(&type_oid.to_string());
        arg_types.push(' ');
    }

    let (schema, function) = procedure_name(text);
    let query = match schema {
        Some(_) => format!(
            "select count(*) > 0 from pg_proc p left join pg_namespace n on p.pronamespace = n.oid \
             where {RETURNS_RECORD_PREDICATE} and n.nspname=:nspname"
        ),
        None => format!("select count(*) > 0 from pg_proc p where {RETURNS_RECORD_PREDICATE}"),
    };

    let mut command = Command::with_session(&query, session);
    let parameters = command.parameters_mut();
    parameters.add(Parameter::typed("proargtypes", PgType::OidVector, arg_types));
    parameters.add(Parameter::typed("proname", PgType::Name, function));
    if let Some(schema) = schema {
        parameters.add(Parameter::typed("nspname", PgType::Name, schema));
    }
    Some(command)
}

/// Whether the function called by `text` needs a column definition list.
pub(crate) fn needs_column_list<S: Session>(
    session: &mut S,
    text: &str,
    params: &ParameterSet,
) -> Result<bool> {
    if params.is_empty() {
        return Ok(false);
    }
    let Some(mut query) = returns_record_query(session, text, params) else {
        return Ok(false);
    };
    let returns_record = matches!(query.execute_scalar(session)?, Some(Value::Bool(true)));
    tracing::debug!(function = text, returns_record, "checked function result type");
    Ok(returns_record)
}

/// Whether the current result is a single refcursor column.
pub(crate) fn is_refcursor_result<S: Session>(reader: &Reader<'_, S>) -> bool {
    reader.field_count() == 1 && reader.data_type_name(0).as_deref() == Some("refcursor")
}

/// Read every cursor name and build the text fetching all of them.
///
/// An empty result yields `;` so the follow-up query is never empty.
pub(crate) fn fetch_all_text<S: Session>(reader: &mut Reader<'_, S>) -> Result<String> {
    let mut text = String::new();
    while reader.read()? {
        let Some(cursor) = reader.get::<Option<String>>(0)? else {
            continue;
        };
        text.push_str("FETCH ALL FROM \"");
        text.push_str(&cursor.replace('"', "\"\""));
        text.push_str("\";\r\n");
    }
    if text.is_empty() {
        text.push(';');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_unquoted_names() {
        assert_eq!(procedure_name("MyFunc"), (None, "myfunc".to_string()));
        assert_eq!(
            procedure_name("Sales.\"Totals\"(:a)"),
            (Some("sales".to_string()), "\"Totals\"".to_string())
        );
        assert_eq!(procedure_name(" f ( 1 ) "), (None, "f".to_string()));
    }
}
