//! Blocking session over TCP or Unix sockets.

mod cancel;
mod session;
mod stream;

pub use cancel::CancelToken;
pub use session::{Notification, WireSession};
pub use stream::{Stream, Transport};
