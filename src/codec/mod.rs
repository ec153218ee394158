//! Codec adapters
//!
//! Two codec variants share one capability interface. Both are backed by
//! libopus and differ in how it is driven:
//!
//! | kind | bitrate mode | application | frame |
//! |------|--------------|-------------|-------|
//! | `LowLatency` | constant | restricted low delay | 10 ms |
//! | `HighFidelity` | unconstrained VBR | general audio | 20 ms |
//!
//! Pipelines only see [`FrameEncoder`] / [`FrameDecoder`] trait objects
//! created by [`open_encoder`] / [`open_decoder`] from the stream's
//! [`CodecKind`]. Dropping an adapter releases the native codec state.

pub mod decoder;
pub mod encoder;
pub mod latency;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;
pub use latency::{measure_round_trip, LatencyReport};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioFrame;
use crate::error::{CodecError, ProtocolError};
use crate::protocol::StreamParams;

/// Sample rates libopus accepts
pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Codec variant announced on the wire
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    /// Constant bitrate, small frames, minimal algorithmic delay
    LowLatency,
    /// Variable bitrate, larger frames, higher fidelity
    HighFidelity,
}

impl CodecKind {
    /// Wire identifier
    pub fn id(self) -> u8 {
        match self {
            CodecKind::LowLatency => 0,
            CodecKind::HighFidelity => 1,
        }
    }

    /// Duration of one codec frame
    pub fn frame_duration(self) -> Duration {
        match self {
            CodecKind::LowLatency => Duration::from_millis(10),
            CodecKind::HighFidelity => Duration::from_millis(20),
        }
    }

    /// Samples per channel in one codec frame at `sample_rate`
    pub fn frame_size(self, sample_rate: u32) -> usize {
        (sample_rate as u128 * self.frame_duration().as_micros() / 1_000_000) as usize
    }

    fn application(self) -> opus::Application {
        match self {
            CodecKind::LowLatency => opus::Application::LowDelay,
            CodecKind::HighFidelity => opus::Application::Audio,
        }
    }
}

impl TryFrom<u8> for CodecKind {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(CodecKind::LowLatency),
            1 => Ok(CodecKind::HighFidelity),
            other => Err(ProtocolError::UnknownCodec(other)),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::LowLatency => write!(f, "low-latency"),
            CodecKind::HighFidelity => write!(f, "high-fidelity"),
        }
    }
}

/// Compressed output of one codec frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub codec: CodecKind,
    pub data: Bytes,
}

impl EncodedChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encoding half of a codec adapter
pub trait FrameEncoder {
    fn kind(&self) -> CodecKind;

    /// Exact PCM byte count `encode` accepts
    fn frame_bytes(&self) -> usize;

    /// Encode exactly one frame of interleaved PCM
    fn encode(&mut self, pcm: &[u8]) -> Result<EncodedChunk, CodecError>;
}

/// Decoding half of a codec adapter
pub trait FrameDecoder {
    /// Decode one chunk. Errors leave the decoder usable for the next chunk.
    fn decode(&mut self, payload: &[u8]) -> Result<AudioFrame, CodecError>;
}

/// Build the encoder for `params`
pub fn open_encoder(
    params: &StreamParams,
    bitrate: u32,
) -> Result<Box<dyn FrameEncoder>, CodecError> {
    let encoder = match params.codec {
        CodecKind::LowLatency => OpusEncoder::new(params, bitrate, false)?,
        CodecKind::HighFidelity => OpusEncoder::new(params, bitrate, true)?,
    };
    Ok(Box::new(encoder))
}

/// Build the decoder for `params`
pub fn open_decoder(params: &StreamParams) -> Result<Box<dyn FrameDecoder>, CodecError> {
    let decoder = match params.codec {
        CodecKind::LowLatency | CodecKind::HighFidelity => OpusDecoder::new(params)?,
    };
    Ok(Box::new(decoder))
}

fn opus_channels(channels: u8) -> Option<opus::Channels> {
    match channels {
        1 => Some(opus::Channels::Mono),
        2 => Some(opus::Channels::Stereo),
        _ => None,
    }
}
