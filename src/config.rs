//! Application configuration
//!
//! Settings are read from a TOML file; every section and field is optional
//! and falls back to its default. Command-line flags are applied on top by
//! the binaries (see [`crate::cli`]).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::SampleFormat;
use crate::codec::{CodecKind, SUPPORTED_SAMPLE_RATES};
use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::StreamParams;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub capture: CaptureSettings,
    pub playback: PlaybackSettings,
}

/// Socket settings shared by both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receiver host the sender streams to
    pub server: Option<String>,
    pub port: u16,
    /// Local address the receiver binds
    pub bind_address: IpAddr,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub poll_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: DEFAULT_UDP_PORT,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            send_buffer_size: 256 * 1024,
            recv_buffer_size: 256 * 1024,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl NetworkConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Stream parameters the sender announces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub format: SampleFormat,
    pub codec: CodecKind,
    /// Bits per second
    pub bitrate: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            format: SampleFormat::S16Le,
            codec: CodecKind::LowLatency,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl StreamConfig {
    pub fn params(&self) -> StreamParams {
        StreamParams::new(self.codec, self.format, self.channels, self.sample_rate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Input device name; the host default when unset
    pub device: Option<String>,
    /// Stream a sine of this frequency instead of a device
    pub tone_hz: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Output device name; the host default when unset
    pub device: Option<String>,
    pub prebuffer_ms: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            device: None,
            prebuffer_ms: DEFAULT_PREBUFFER_MS,
        }
    }
}

impl PlaybackSettings {
    pub fn prebuffer(&self) -> Duration {
        Duration::from_millis(self.prebuffer_ms as u64)
    }
}

impl AppConfig {
    /// Default config file location, `<config_dir>/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lan-audio-link")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
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

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings no codec or socket could honor
    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;
        if !(1..=2).contains(&stream.channels) {
            return Err(Error::Config(format!(
                "channels must be 1 or 2, got {}",
                stream.channels
            )));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&stream.sample_rate) {
            return Err(Error::Config(format!(
                "sample rate {} not one of {:?}",
                stream.sample_rate, SUPPORTED_SAMPLE_RATES
            )));
        }
        if stream.bitrate == 0 {
            return Err(Error::Config("bitrate must be positive".to_string()));
        }
        if self.network.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        Ok(())
    }
}
