//! Error types for the audio receiver

use std::path::PathBuf;
use thiserror::Error;

/// Startup and control-surface errors.
///
/// Session faults stay in their subsystem enums; they are logged by the
/// session manager and never reach the process edge.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol violations. Each one ends the current session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Bad header magic: 0x{found:08X} (expected 0x{expected:08X})")]
    BadMagic { found: u32, expected: u32 },

    #[error("Empty payload: {frame_count} frames x {channel_count} ch x {bytes_per_sample} bytes")]
    EmptyPayload {
        frame_count: u16,
        channel_count: u8,
        bytes_per_sample: u8,
    },

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Unsupported sample width: {0} bytes")]
    UnsupportedSampleWidth(u8),
}

/// Faults raised while pulling frames off a byte source
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Container (WAV file) errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Container is not open")]
    NotOpen,

    #[error("Short write: {written} of {requested} bytes")]
    ShortWrite { written: usize, requested: usize },

    #[error("Failed to reopen {path} for finalize: {source}")]
    Reopen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to patch header sizes: {0}")]
    Patch(#[source] std::io::Error),

    #[error("Container already finalized")]
    AlreadyFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Accept failed: {0}")]
    AcceptFailed(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
