//! Command-side protocol state.
//!
//! Pure state: nothing here performs I/O. The command drives these through
//! a [`Session`](crate::session::Session).

pub mod bind;
pub mod prepare;

pub use bind::{BindMessage, ExecuteMessage, bind_parameters};
pub use prepare::{PrepareState, PreparedPlan, result_formats};
