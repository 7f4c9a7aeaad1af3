//! PostgreSQL command execution core.
//!
//! # Features
//!
//! - **Text rewriting**: `:name` / `@name` markers are replaced with inline
//!   literals or `$n` placeholders, outside of quoted literals only
//! - **Prepared plans**: V3 Parse/Describe with incremental rebinding, or V2
//!   `PREPARE`/`EXECUTE` text
//! - **Function calls**: `SELECT * FROM f(...)`, column definition lists
//!   for record-returning functions, transparent refcursor fetching
//! - **Session-agnostic**: commands run on anything implementing [`Session`];
//!   [`sync::WireSession`] is the blocking socket implementation
//!
//! # Example
//!
//! ```no_run
//! use zero_pgcommand::sync::{Stream, WireSession};
//! use zero_pgcommand::{Command, Parameter, SessionOpts};
//!
//! fn main() -> zero_pgcommand::Result<()> {
//!     let opts = SessionOpts::try_from("postgres://localhost:5432/?always_prepare=true")?;
//!     // the stream must be past startup and authentication
//!     let stream = Stream::connect_tcp(&opts.host, opts.port)?;
//!     let mut session = WireSession::new(stream, opts);
//!
//!     let mut cmd = Command::with_session("SELECT name FROM users WHERE id = :id", &session);
//!     cmd.parameters_mut().add(Parameter::new("id", 42));
//!     let mut reader = cmd.execute_reader(&mut session)?;
//!     while reader.read()? {
//!         let name: String = reader.get(0)?;
//!         println!("{name}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod conversion;
pub mod error;
pub mod function;
pub mod opts;
pub mod parameter;
pub mod protocol;
pub mod reader;
pub mod response;
pub mod session;
pub mod sql;
pub mod state;
pub mod transaction;
pub mod types;
pub mod value;

#[cfg(feature = "sync")]
pub mod sync;

pub use command::{Command, CommandType};
pub use conversion::FromWireValue;
pub use error::{Error, ErrorFields, Result};
pub use opts::SessionOpts;
pub use parameter::{Direction, Parameter, ParameterSet};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use reader::Reader;
pub use response::{Response, ResponseStream, RowDescription};
pub use session::{NotificationBlocker, ProtocolVersion, Session};
pub use state::PrepareState;
pub use transaction::Transaction;
pub use types::{EncodeOptions, PgType, TypeCodec};
pub use value::Value;
