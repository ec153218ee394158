//! Command-line interface
//!
//! Handles argument parsing, logging setup, and layering flags over the
//! configuration file.

use clap::{ArgAction, Args, Parser};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audio::SampleFormat;
use crate::codec::CodecKind;
use crate::config::AppConfig;

/// Flags shared by both binaries
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file (default: <config dir>/lan-audio-link/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List audio devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Increase logging verbosity
    /// -v = debug, -vv = trace
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Log level implied by the verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::ERROR
        } else {
            match self.verbose {
                0 => LevelFilter::INFO,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }
}

/// Capture audio and stream it to a receiver
#[derive(Parser, Debug)]
#[command(name = "sender")]
#[command(author, version, about, long_about = None)]
pub struct SenderArgs {
    /// Receiver host name or address
    #[arg(short, long, value_name = "ADDR", required_unless_present = "list_devices")]
    pub server: Option<String>,

    /// Receiver UDP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Sample rate in Hz
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Codec bitrate in kbit/s
    #[arg(short, long, value_name = "KBPS")]
    pub bitrate: Option<u32>,

    /// Channel count (1 or 2)
    #[arg(short, long)]
    pub channels: Option<u8>,

    /// PCM sample format
    #[arg(long, value_enum)]
    pub format: Option<SampleFormat>,

    /// Codec variant
    #[arg(long, value_enum)]
    pub codec: Option<CodecKind>,

    /// Input device name
    #[arg(long)]
    pub device: Option<String>,

    /// Stream a sine tone of this frequency instead of capturing
    #[arg(long, value_name = "HZ")]
    pub tone: Option<f32>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl SenderArgs {
    /// Layer flags over file settings
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.network.server = Some(server.clone());
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(rate) = self.rate {
            config.stream.sample_rate = rate;
        }
        if let Some(kbps) = self.bitrate {
            config.stream.bitrate = kbps.saturating_mul(1000);
        }
        if let Some(channels) = self.channels {
            config.stream.channels = channels;
        }
        if let Some(format) = self.format {
            config.stream.format = format;
        }
        if let Some(codec) = self.codec {
            config.stream.codec = codec;
        }
        if let Some(device) = &self.device {
            config.capture.device = Some(device.clone());
        }
        if let Some(tone) = self.tone {
            config.capture.tone_hz = Some(tone);
        }
    }
}

/// Receive a stream and play it
#[derive(Parser, Debug)]
#[command(name = "receiver")]
#[command(author, version, about, long_about = None)]
pub struct ReceiverArgs {
    /// UDP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Playback prebuffer in milliseconds
    #[arg(short = 'B', long, value_name = "MS")]
    pub prebuffer: Option<u32>,

    /// Local address to bind
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Output device name
    #[arg(long)]
    pub device: Option<String>,

    /// Close a silent session after this many milliseconds (0 disables)
    #[arg(long, value_name = "MS")]
    pub idle_timeout: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ReceiverArgs {
    /// Layer flags over file settings
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(prebuffer) = self.prebuffer {
            config.playback.prebuffer_ms = prebuffer;
        }
        if let Some(bind) = self.bind {
            config.network.bind_address = bind;
        }
        if let Some(device) = &self.device {
            config.playback.device = Some(device.clone());
        }
        if let Some(idle) = self.idle_timeout {
            config.network.idle_timeout_ms = idle;
        }
    }
}

/// Measure codec delay and processing cost
#[derive(Parser, Debug)]
#[command(name = "codec-latency")]
#[command(author, version, about, long_about = None)]
pub struct LatencyArgs {
    /// Codec variant to measure (default: all)
    #[arg(long, value_enum)]
    pub codec: Option<CodecKind>,

    /// Sample rate in Hz
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Codec bitrate in kbit/s
    #[arg(short, long, value_name = "KBPS")]
    pub bitrate: Option<u32>,

    /// Channel count (1 or 2)
    #[arg(short, long)]
    pub channels: Option<u8>,

    /// PCM sample format
    #[arg(long, value_enum)]
    pub format: Option<SampleFormat>,

    /// Codec frames per run
    #[arg(short = 'n', long, default_value_t = 1024)]
    pub frames: usize,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl LatencyArgs {
    /// Layer flags over file settings
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(rate) = self.rate {
            config.stream.sample_rate = rate;
        }
        if let Some(kbps) = self.bitrate {
            config.stream.bitrate = kbps.saturating_mul(1000);
        }
        if let Some(channels) = self.channels {
            config.stream.channels = channels;
        }
        if let Some(format) = self.format {
            config.stream.format = format;
        }
    }

    /// Codec variants to measure
    pub fn codecs(&self) -> Vec<CodecKind> {
        match self.codec {
            Some(codec) => vec![codec],
            None => vec![CodecKind::LowLatency, CodecKind::HighFidelity],
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flags.
pub fn init_logging(args: &CommonArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Print the audio devices the host exposes
pub fn print_devices() {
    let devices = crate::audio::list_devices();
    if devices.is_empty() {
        println!("No audio devices found");
        return;
    }

    println!("\n=== Available Audio Devices ===");
    for device in &devices {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}
