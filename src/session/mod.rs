//! Producer sessions

pub mod connection;
pub mod manager;

pub use connection::{run_session, Session, SessionEnd, SessionReport};
pub use manager::{FinalizeOutcome, SessionManager, ShutdownHandle};
