//! PostgreSQL wire protocol encoding and decoding.
//!
//! - `backend`: server → client messages (parsing)
//! - `frontend`: client → server messages (encoding)
//! - `codec`: low-level primitives
//! - `types`: common protocol types (FormatCode, Oid, TransactionStatus)

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::RawMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
