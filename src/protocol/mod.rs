//! ESP2 stream protocol: fixed 34-byte header followed by raw sample slots

pub mod decoder;
pub mod header;

pub use decoder::{DecoderStats, FrameDecoder};
pub use header::{Frame, FrameHeader};
