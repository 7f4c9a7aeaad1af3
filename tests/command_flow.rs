//! End-to-end command execution against a scripted backend.

mod common;

use std::time::Duration;

use common::backend::*;
use common::{default_session, queries, session, tags};
use zero_pgcommand::protocol::backend::BackendKeyData;
use zero_pgcommand::{
    Command, CommandType, Direction, Error, Parameter, PgType, PrepareState, ProtocolVersion,
    Session, SessionOpts, Transaction, TransactionStatus, Value,
};

#[test]
fn multi_statement_text_runs_unprepared() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        row_description(&[("a", INT4)]),
        text_row(&["1"]),
        command_complete("SELECT 1"),
        row_description(&[("b", INT4)]),
        text_row(&["2"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);

    let mut cmd = Command::with_session("SELECT 1 AS a; SELECT 2 AS b", &session);
    {
        let mut reader = cmd.execute_reader(&mut session).unwrap();
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 1);
        assert!(!reader.read().unwrap());
        assert!(reader.next_result().unwrap());
        assert_eq!(reader.field_name(0), Some("b"));
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 2);
        assert!(!reader.next_result().unwrap());
    }
    assert_eq!(
        queries(&stream.take_sent()),
        vec!["SELECT 1 AS a;\r\nSELECT 2 AS b"]
    );

    let err = cmd.prepare(&mut session).unwrap_err();
    assert!(err.is_usage());
    assert!(stream.take_sent().is_empty());
    assert!(!session.is_broken());

    // still runs through the simple protocol
    assert!(matches!(cmd.prepare_state(), PrepareState::NotPrepared));
    stream.reply(&[
        command_complete("SELECT 1"),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    assert_eq!(cmd.execute_non_query(&mut session).unwrap(), Some(2));
    assert_eq!(
        queries(&stream.take_sent()),
        vec!["SELECT 1 AS a;\r\nSELECT 2 AS b"]
    );
}

#[test]
fn inline_parameters_and_timeout() {
    let (mut session, stream) = default_session();
    stream.reply(&[command_complete("UPDATE 3"), ready(b'I')]);

    let mut cmd = Command::with_session("UPDATE t SET name = :name WHERE id = @id", &session);
    cmd.parameters_mut().add(Parameter::new("name", "o'neil"));
    cmd.parameters_mut().add(Parameter::new("@id", 5));
    cmd.set_command_timeout(3).unwrap();

    assert_eq!(cmd.execute_non_query(&mut session).unwrap(), Some(3));
    assert_eq!(
        queries(&stream.take_sent()),
        vec!["UPDATE t SET name = (('o''neil')) WHERE id = ((5))"]
    );
    assert_eq!(stream.timeouts(), vec![Some(Duration::from_secs(3))]);
}

#[test]
fn affected_rows_are_summed() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        command_complete("INSERT 17 1"),
        command_complete("DELETE 2"),
        ready(b'I'),
    ]);

    let mut cmd = Command::with_session("INSERT INTO t VALUES (1); DELETE FROM u", &session);
    assert_eq!(cmd.execute_non_query(&mut session).unwrap(), Some(3));
    assert_eq!(cmd.last_inserted_oid(), Some(17));
}

#[test]
fn statements_without_counts_report_none() {
    let (mut session, stream) = default_session();
    stream.reply(&[command_complete("CREATE TABLE"), ready(b'I')]);

    let mut cmd = Command::with_session("CREATE TABLE t (id int)", &session);
    assert_eq!(cmd.execute_non_query(&mut session).unwrap(), None);
}

#[test]
fn v3_prepare_then_rebind_changed_values() {
    let (mut session, stream) = default_session();
    let mut cmd = Command::with_session("SELECT :a + :b AS n", &session);
    cmd.parameters_mut().add(Parameter::new("a", 1));
    cmd.parameters_mut().add(Parameter::new("b", 2));

    stream.reply(&[
        parse_complete(),
        parameter_description(&[INT4, INT4]),
        row_description(&[("n", INT4)]),
        ready(b'I'),
    ]);
    cmd.prepare(&mut session).unwrap();
    let sent = stream.take_sent();
    assert_eq!(tags(&sent), "PDS");
    assert_eq!(sent[0].name(), "zero_plan1");
    assert!(String::from_utf8_lossy(&sent[0].body).contains("SELECT ($1) + ($2) AS n"));
    assert_eq!(cmd.prepare_state().plan_name(), Some("zero_plan1"));

    // first execution describes the portal
    stream.reply(&[
        bind_complete(),
        row_description_with_format(&[("n", INT4)], 1),
        data_row(&[Some(&3i32.to_be_bytes())]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    let value = cmd.execute_scalar(&mut session).unwrap();
    assert_eq!(value, Some(Value::Int32(3)));
    let sent = stream.take_sent();
    assert_eq!(tags(&sent), "BDES");
    assert_eq!(
        sent[0].bind_values().unwrap(),
        vec![Some(1i32.to_be_bytes().to_vec()), Some(2i32.to_be_bytes().to_vec())]
    );

    cmd.parameters_mut().get_mut("b").unwrap().set_value(5);
    assert!(cmd.parameters().get("a").unwrap().is_bound());
    assert!(!cmd.parameters().get("b").unwrap().is_bound());

    // later executions reuse the cached description
    stream.reply(&[
        bind_complete(),
        data_row(&[Some(&6i32.to_be_bytes())]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    {
        let mut reader = cmd.execute_reader(&mut session).unwrap();
        assert_eq!(reader.field_name(0), Some("n"));
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 6);
    }
    let sent = stream.take_sent();
    assert_eq!(tags(&sent), "BES");
    assert_eq!(
        sent[0].bind_values().unwrap(),
        vec![Some(1i32.to_be_bytes().to_vec()), Some(5i32.to_be_bytes().to_vec())]
    );
    assert!(cmd.parameters().iter().all(|p| p.is_bound()));
}

#[test]
fn text_change_replaces_the_plan() {
    let opts = SessionOpts {
        always_prepare: true,
        ..SessionOpts::default()
    };
    let (mut session, stream) = session(opts);
    let mut cmd = Command::with_session("SELECT 1", &session);
    assert!(matches!(cmd.prepare_state(), PrepareState::NeedsPrepare));

    stream.reply(&[
        parse_complete(),
        parameter_description(&[]),
        no_data(),
        ready(b'I'),
        bind_complete(),
        no_data(),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    cmd.execute_non_query(&mut session).unwrap();
    assert_eq!(cmd.prepare_state().plan_name(), Some("zero_plan1"));
    assert_eq!(tags(&stream.take_sent()), "PDSBDES");

    cmd.set_text("SELECT 2");
    assert!(cmd.prepare_state().needs_prepare());

    stream.reply(&[
        parse_complete(),
        parameter_description(&[]),
        no_data(),
        ready(b'I'),
        bind_complete(),
        no_data(),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    cmd.execute_non_query(&mut session).unwrap();
    let sent = stream.take_sent();
    assert_eq!(sent[0].name(), "zero_plan2");
    assert!(String::from_utf8_lossy(&sent[0].body).contains("SELECT 2"));
}

#[test]
fn v2_prepare_uses_prepare_and_execute_text() {
    let opts = SessionOpts {
        protocol_version: ProtocolVersion::V2,
        ..SessionOpts::default()
    };
    let (mut session, stream) = session(opts);
    let mut cmd = Command::with_session("SELECT * FROM t WHERE id = :id", &session);
    cmd.parameters_mut()
        .add(Parameter::typed("id", PgType::Int4, 5));

    stream.reply(&[command_complete("PREPARE"), ready(b'I')]);
    cmd.prepare(&mut session).unwrap();
    assert!(matches!(
        cmd.prepare_state(),
        PrepareState::V2Prepared { .. }
    ));

    stream.reply(&[
        row_description(&[("id", INT4)]),
        text_row(&["5"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    assert_eq!(
        cmd.execute_scalar(&mut session).unwrap(),
        Some(Value::Int32(5))
    );
    assert_eq!(
        queries(&stream.take_sent()),
        vec![
            "PREPARE zero_plan1 AS SELECT * FROM t WHERE id = ($1::int4)",
            "EXECUTE zero_plan1((5)::int4)",
        ]
    );
}

#[test]
fn record_function_gets_column_list() {
    let (mut session, stream) = default_session();
    let mut cmd = Command::with_session("myfunc(:a)", &session);
    cmd.set_command_type(CommandType::StoredProcedure);
    cmd.parameters_mut()
        .add(Parameter::typed("a", PgType::Int4, 0).with_direction(Direction::Output));
    cmd.parameters_mut()
        .add(Parameter::typed("b", PgType::Text, "").with_direction(Direction::Output));

    stream.reply(&[
        row_description(&[("?column?", BOOL)]),
        text_row(&["t"]),
        command_complete("SELECT 1"),
        ready(b'I'),
        row_description(&[("a", INT4), ("b", TEXT)]),
        text_row(&["7", "seven"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);
    {
        let mut reader = cmd.execute_reader(&mut session).unwrap();
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 7);
        assert_eq!(reader.get::<String>(1).unwrap(), "seven");
    }
    let sent = queries(&stream.take_sent());
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains("proname=(('myfunc')::name)"));
    assert_eq!(sent[1], "SELECT * FROM myfunc() AS (a int4, b text)");

    // the catalog answer is remembered for the same text
    stream.reply(&[
        row_description(&[("a", INT4), ("b", TEXT)]),
        command_complete("SELECT 0"),
        ready(b'I'),
    ]);
    cmd.execute_non_query(&mut session).unwrap();
    assert_eq!(
        queries(&stream.take_sent()),
        vec!["SELECT * FROM myfunc() AS (a int4, b text)"]
    );
}

#[test]
fn refcursor_results_are_fetched() {
    let (mut session, stream) = default_session();
    let mut cmd = Command::with_session("get_cursors", &session);
    cmd.set_command_type(CommandType::StoredProcedure);

    stream.reply(&[
        row_description(&[("get_cursors", REFCURSOR)]),
        text_row(&["<unnamed portal 1>"]),
        text_row(&["c\"2"]),
        command_complete("SELECT 2"),
        ready(b'I'),
        row_description(&[("id", INT4)]),
        text_row(&["1"]),
        command_complete("FETCH 1"),
        row_description(&[("name", TEXT)]),
        text_row(&["x"]),
        command_complete("FETCH 1"),
        ready(b'I'),
    ]);
    {
        let mut reader = cmd.execute_reader(&mut session).unwrap();
        assert_eq!(reader.field_name(0), Some("id"));
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 1);
        assert!(reader.next_result().unwrap());
        assert!(reader.read().unwrap());
        assert_eq!(reader.get::<&str>(0).unwrap(), "x");
    }
    assert_eq!(
        queries(&stream.take_sent()),
        vec![
            "SELECT * FROM get_cursors()".to_string(),
            "FETCH ALL FROM \"<unnamed portal 1>\";\r\nFETCH ALL FROM \"c\"\"2\";\r\n".to_string(),
        ]
    );
}

#[test]
fn empty_refcursor_result_sends_empty_fetch() {
    let (mut session, stream) = default_session();
    let mut cmd = Command::with_session("get_cursors", &session);
    cmd.set_command_type(CommandType::StoredProcedure);

    stream.reply(&[
        row_description(&[("get_cursors", REFCURSOR)]),
        command_complete("SELECT 0"),
        ready(b'I'),
        empty_query_response(),
        ready(b'I'),
    ]);
    assert_eq!(cmd.execute_non_query(&mut session).unwrap(), None);
    assert_eq!(
        queries(&stream.take_sent()),
        vec!["SELECT * FROM get_cursors()".to_string(), ";".to_string()]
    );
    assert_eq!(stream.unread(), 0);
}

#[test]
fn server_error_keeps_session_usable() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        error("ERROR", "42703", "column \"boom\" does not exist"),
        ready(b'I'),
        row_description(&[("one", INT4)]),
        text_row(&["1"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);

    let mut bad = Command::with_session("SELECT boom", &session);
    let err = bad.execute_non_query(&mut session).unwrap_err();
    assert_eq!(err.sqlstate(), Some("42703"));
    assert!(!err.is_connection_broken());
    assert!(!session.is_broken());

    let mut good = Command::with_session("SELECT 1 AS one", &session);
    assert_eq!(good.execute_scalar(&mut session).unwrap(), Some(Value::Int32(1)));
}

#[test]
fn scalar_reports_errors_after_the_first_row() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        row_description(&[("one", INT4)]),
        text_row(&["1"]),
        command_complete("SELECT 1"),
        error("ERROR", "22012", "division by zero"),
        ready(b'E'),
    ]);

    let mut cmd = Command::with_session("SELECT 1 AS one; SELECT 1/0", &session);
    let err = cmd.execute_scalar(&mut session).unwrap_err();
    assert_eq!(err.sqlstate(), Some("22012"));
    assert_eq!(stream.unread(), 0);
    assert_eq!(session.transaction_status(), TransactionStatus::Failed);
}

#[test]
fn io_fault_while_skipping_to_ready_invalidates_session() {
    let (mut session, stream) = default_session();
    // the connection drops before ReadyForQuery
    stream.reply(&[error("ERROR", "42703", "column \"boom\" does not exist")]);

    let mut cmd = Command::with_session("SELECT boom", &session);
    let err = cmd.execute_non_query(&mut session).unwrap_err();
    assert!(err.is_connection_broken());
    assert!(session.is_broken());
}

#[test]
fn abandoned_reader_is_drained_by_next_exchange() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        row_description(&[("n", INT4)]),
        text_row(&["1"]),
        text_row(&["2"]),
        command_complete("SELECT 2"),
        ready(b'I'),
        row_description(&[("m", INT4)]),
        text_row(&["9"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);

    let mut first = Command::with_session("SELECT n FROM t", &session);
    {
        let mut reader = first.execute_reader(&mut session).unwrap();
        assert!(reader.read().unwrap());
    }
    let mut second = Command::with_session("SELECT 9 AS m", &session);
    assert_eq!(second.execute_scalar(&mut session).unwrap(), Some(Value::Int32(9)));
    assert_eq!(stream.unread(), 0);
}

#[test]
fn async_messages_are_consumed_by_the_session() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        notice("hello"),
        notification(42, "jobs", "new"),
        parameter_status("standard_conforming_strings", "off"),
        command_complete("SELECT 0"),
        ready(b'I'),
    ]);

    let mut cmd = Command::with_session("SELECT 1 WHERE false", &session);
    cmd.execute_non_query(&mut session).unwrap();

    let received = session.notifications().pop().unwrap();
    assert_eq!(received.channel, "jobs");
    assert_eq!(received.payload, "new");
    assert!(!session.encode_options().standard_conforming_strings);
    assert_eq!(session.server_param("standard_conforming_strings"), Some("off"));
}

#[test]
fn blind_execution_rejects_rows() {
    let (mut session, stream) = default_session();
    stream.reply(&[
        row_description(&[("n", INT4)]),
        text_row(&["1"]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ]);

    let mut cmd = Command::with_session("SELECT 1", &session);
    assert!(cmd.execute_blind(&mut session).unwrap_err().is_usage());
    assert!(!session.is_broken());
    assert_eq!(stream.unread(), 0);
}

#[test]
fn send_fault_invalidates_session() {
    let (mut session, stream) = default_session();
    stream.fail_writes();

    let mut cmd = Command::with_session("SELECT 1", &session);
    let err = cmd.execute_non_query(&mut session).unwrap_err();
    assert!(matches!(err, Error::Broken(_)));
    assert!(session.is_broken());

    let err = cmd.execute_non_query(&mut session).unwrap_err();
    assert!(matches!(err, Error::ConnectionBroken));
}

#[test]
fn failed_cancel_invalidates_session() {
    // a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let opts = SessionOpts {
        host: "127.0.0.1".into(),
        port,
        ..SessionOpts::default()
    };
    let (session, _stream) = session(opts);
    let session = session.with_backend_key(BackendKeyData {
        pid: 1,
        secret_key: 2,
    });
    let token = session.cancel_token().unwrap();

    let cmd = Command::with_session("SELECT pg_sleep(10)", &session);
    cmd.cancel(&token);
    assert!(session.is_broken());
}

#[test]
fn transaction_pins_command_to_its_session() {
    let (mut first, first_stream) = default_session();
    let (second, _second_stream) = default_session();

    first_stream.reply(&[command_complete("BEGIN"), ready(b'T')]);
    let tx = Transaction::begin(&mut first).unwrap();
    assert_eq!(first.transaction_status(), TransactionStatus::InTransaction);

    let mut cmd = Command::with_session("SELECT 1", &first);
    cmd.set_transaction(Some(&tx)).unwrap();
    assert!(cmd.set_session(&second).unwrap_err().is_usage());
    assert!(Transaction::begin(&mut first).unwrap_err().is_usage());

    first_stream.reply(&[command_complete("COMMIT"), ready(b'I')]);
    tx.commit(&mut first).unwrap();
    assert_eq!(
        queries(&first_stream.take_sent()),
        vec!["BEGIN", "COMMIT"]
    );

    cmd.set_session(&second).unwrap();
    assert_eq!(cmd.session_id(), Some(second.session_id()));
    assert!(cmd.transaction().is_none());
}

#[test]
fn failed_commit_keeps_transaction_open() {
    let (mut session, stream) = default_session();
    stream.reply(&[command_complete("BEGIN"), ready(b'T')]);
    let tx = Transaction::begin(&mut session).unwrap();

    let mut cmd = Command::with_session("SELECT 1", &session);
    cmd.set_transaction(Some(&tx)).unwrap();

    stream.reply(&[
        error("ERROR", "40001", "could not serialize access"),
        ready(b'T'),
    ]);
    let err = tx.clone().commit(&mut session).unwrap_err();
    assert_eq!(err.sqlstate(), Some("40001"));
    assert!(tx.is_open());
    assert!(cmd.transaction().is_some());

    stream.reply(&[command_complete("ROLLBACK"), ready(b'I')]);
    tx.rollback(&mut session).unwrap();
    assert!(cmd.transaction().is_none());
}

#[test]
fn moving_sessions_drops_the_plan() {
    let (mut first, stream) = default_session();
    let (second, _) = default_session();

    let mut cmd = Command::with_session("SELECT 1", &first);
    stream.reply(&[
        parse_complete(),
        parameter_description(&[]),
        row_description(&[("?column?", INT4)]),
        ready(b'I'),
    ]);
    cmd.prepare(&mut first).unwrap();
    assert!(cmd.is_prepared());

    cmd.set_session(&second).unwrap();
    assert!(cmd.prepare_state().needs_prepare());
}
