//! # LAN Audio Link
//!
//! Low-latency point-to-point audio streaming over UDP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── SENDER ────────────────────────────────┐
//! │                                                                        │
//! │  ┌──────────────┐  chunks  ┌─────────────┐  frames  ┌──────────────┐   │
//! │  │ AudioCapture │ ───────▶ │  FrameRing  │ ───────▶ │ FrameEncoder │   │
//! │  │ (cpal+bridge)│          │ (audio::    │          │   (codec)    │   │
//! │  │  ToneSource  │          │   buffer)   │          └──────┬───────┘   │
//! │  └──────────────┘          └─────────────┘                 │           │
//! │                                                            ▼           │
//! │                                                   ┌────────────────┐   │
//! │                      start ─▶ data... ─▶ stop     │   Packetizer   │   │
//! │                                                   │   (protocol)   │   │
//! │                                                   └───────┬────────┘   │
//! └───────────────────────────────────────────────────────────┼────────────┘
//!                                                             │ UDP
//!                                                             ▼
//! ┌─────────────────────────────── RECEIVER ───────────────────────────────┐
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────────────────┐ │
//! │  │ PacketSource│ ─▶│ header check │ ─▶│ StreamSession (re)bind       │ │
//! │  │  (UDP, poll │   │ magic / len  │   │  Depacketizer → FrameDecoder │ │
//! │  │   timeout)  │   └──────────────┘   │  → PlaybackSink (cpal)       │ │
//! │  └─────────────┘                      └──────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod shutdown;

pub use error::{Error, Result};
pub use shutdown::Shutdown;

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u8 = 2;

    /// Default codec bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 320_000;

    /// Default UDP port for audio streaming
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Maximum datagram size put on the wire
    pub const MAX_PACKET_SIZE: usize = 1400;

    /// Upper bound of a single encoded chunk
    pub const MAX_ENCODED_CHUNK: usize = 4000;

    /// Seconds of audio the sender's frame ring can hold
    pub const RING_BUFFER_SECONDS: u32 = 2;

    /// Receiver socket poll timeout in milliseconds
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;

    /// Silence after which an active receiver session is torn down
    pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 1000;

    /// Default playback prebuffer in milliseconds
    pub const DEFAULT_PREBUFFER_MS: u32 = 20;

    /// Interval between periodic statistics log lines
    pub const STATS_INTERVAL_SECS: u64 = 5;
}
