//! Wire protocol
//!
//! Every datagram starts with a fixed 20-byte header carrying the full
//! stream descriptor, so a receiver can (re)build its session from any
//! packet. Explicit start/stop packets bracket a stream. See [`header`] for
//! the byte layout and [`packetizer`] for how codec chunks are split.

pub mod header;
pub mod packetizer;

pub use header::{flags, Packet, PacketHeader, PacketKind, HEADER_SIZE, MAX_PAYLOAD_SIZE, PACKET_MAGIC};
pub use packetizer::{Depacketizer, Packetizer};

use crate::audio::SampleFormat;
use crate::codec::CodecKind;
use crate::error::ProtocolError;

/// Parameters a stream is announced with; a receiver session is bound to them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamParams {
    pub codec: CodecKind,
    pub format: SampleFormat,
    pub channels: u8,
    pub sample_rate: u32,
}

impl StreamParams {
    pub fn new(codec: CodecKind, format: SampleFormat, channels: u8, sample_rate: u32) -> Self {
        Self {
            codec,
            format,
            channels,
            sample_rate,
        }
    }

    /// Bytes in one sampling instant across all channels
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.channels == 0 {
            return Err(ProtocolError::InvalidDescriptor("zero channels".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(ProtocolError::InvalidDescriptor("zero sample rate".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Display for StreamParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} Hz {}ch {}",
            self.codec, self.sample_rate, self.channels, self.format
        )
    }
}
