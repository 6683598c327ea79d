//! Audio subsystem module

pub mod convert;

pub use convert::{convert, convert_frames_into, convert_into, GainSource};
