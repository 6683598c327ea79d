//! Application configuration
//!
//! Loaded from a TOML file when one is available, otherwise defaults that
//! match the ESP32 streamer firmware are used.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::Error;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub recording: RecordingConfig,
    pub ui: UiConfig,
    /// Gain applied until the control surface changes it
    pub initial_gain: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            recording: RecordingConfig::default(),
            ui: UiConfig::default(),
            initial_gain: 1.0,
        }
    }
}

/// TCP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: IpAddr,
    pub tcp_port: u16,
    /// Disable Nagle on accepted connections
    pub nodelay: bool,
    /// Listen backlog; one producer is expected
    pub backlog: i32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: DEFAULT_TCP_PORT,
            nodelay: true,
            backlog: 1,
        }
    }
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.tcp_port)
    }
}

/// What the producer is expected to send.
///
/// Only `max_payload_bytes` is enforced; the rest is a sanity check that
/// produces warnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bytes_per_sample: u8,
    pub format_id: u16,
    pub max_payload_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bytes_per_sample: IN_BYTES_PER_SAMPLE,
            format_id: FORMAT_INT32_LEFT24,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Output file settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_path: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
        }
    }
}

/// HTTP control surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: IpAddr,
    pub http_port: u16,
    /// Directory with index.html and friends, served at `/`
    pub static_dir: Option<PathBuf>,
    pub min_gain: f64,
    pub max_gain: f64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            static_dir: None,
            min_gain: MIN_GAIN,
            max_gain: MAX_GAIN,
        }
    }
}

impl UiConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Without one, `config.toml` in the
    /// platform config directory is used if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Platform config file location, e.g. `~/.config/esp-audio-receiver/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "esp-audio-receiver")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reject values the receiver cannot work with
    pub fn validate(&self) -> Result<(), Error> {
        if self.stream.channels == 0 {
            return Err(Error::Config("stream.channels must be at least 1".into()));
        }
        if self.stream.sample_rate == 0 {
            return Err(Error::Config("stream.sample_rate must be non-zero".into()));
        }
        if self.stream.max_payload_bytes == 0 {
            return Err(Error::Config("stream.max_payload_bytes must be non-zero".into()));
        }
        if !(self.ui.min_gain > 0.0 && self.ui.min_gain <= self.ui.max_gain) {
            return Err(Error::Config(format!(
                "invalid gain bounds [{}, {}]",
                self.ui.min_gain, self.ui.max_gain
            )));
        }
        if !self.initial_gain.is_finite() || self.initial_gain < 0.0 {
            return Err(Error::Config(format!("invalid initial_gain {}", self.initial_gain)));
        }
        Ok(())
    }
}
