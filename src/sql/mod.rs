//! Lexical handling of command text.
//!
//! Only two things are recognized: statement-terminating semicolons and
//! parameter markers, both outside single-quoted literals. Nothing here
//! parses SQL.

pub mod rewriter;
pub mod scanner;

pub use rewriter::Rewriter;
pub use scanner::{Fragment, split_statements};
