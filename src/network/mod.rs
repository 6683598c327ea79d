//! Network subsystem for the TCP audio transport

pub mod listener;
pub mod source;

pub use listener::{bind_listener, create_listener, try_accept, ACCEPT_POLL_INTERVAL};
pub use source::{ByteSource, Fill};
