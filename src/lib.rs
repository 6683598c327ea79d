//! # ESP Audio Receiver
//!
//! Records a framed microphone stream sent by an ESP32 over TCP into a
//! 24-bit PCM WAV file, with a live-adjustable makeup gain.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐  TCP   ┌──────────────────────────────────────────────────────┐
//! │ ESP32 device │ ─────▶ │ session-manager thread (session::SessionManager)      │
//! └──────────────┘        │                                                      │
//!                         │  ByteSource ─▶ FrameDecoder ─▶ convert() ─▶ Container │──▶ .wav
//!                         │  (network)     (protocol)      (audio)     (recording)│
//!                         └───────────────────────┬──────────────────────────────┘
//!                                                 │ gain (atomic) / counters (lock)
//!                                                 ▼
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │ ControlState (control) ◀── axum HTTP surface (ui)     │
//!                         └──────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one producer session is active at a time. Every new connection
//! truncates and restarts the output file; the RIFF and data size fields are
//! patched once, when the receiver shuts down.

pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod network;
pub mod protocol;
pub mod recording;
pub mod session;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Header magic, "ESP2" read as a little-endian u32
    pub const HEADER_MAGIC: u32 = 0x4553_5032;

    /// Fixed wire size of a frame header
    pub const HEADER_SIZE: usize = 34;

    /// Format id for int32 slots carrying left-aligned 24-bit samples
    pub const FORMAT_INT32_LEFT24: u16 = 1;

    /// Default sample rate of the capture device
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (mic channel only)
    pub const DEFAULT_CHANNELS: u8 = 1;

    /// Bytes per sample slot sent by the device
    pub const IN_BYTES_PER_SAMPLE: u8 = 4;

    /// Bytes per sample written to the WAV file (24-bit)
    pub const OUT_BYTES_PER_SAMPLE: u8 = 3;

    /// Default frames per packet sent by the device
    pub const DEFAULT_FRAMES_PER_PACKET: u16 = 1024;

    /// Default TCP port for the audio stream
    pub const DEFAULT_TCP_PORT: u16 = 7000;

    /// Default HTTP port for the control surface
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default upper bound on a single frame payload
    pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256 * 1024;

    /// Default output file
    pub const DEFAULT_OUTPUT_FILE: &str = "received_audio_esp32.wav";

    /// Gain bounds enforced by the control surface
    pub const MIN_GAIN: f64 = 0.01;
    pub const MAX_GAIN: f64 = 16.0;
}
