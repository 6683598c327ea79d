//! State shared with the control surface

pub mod state;

pub use state::{ControlState, SessionState, SharedControlState, StatusSnapshot};
