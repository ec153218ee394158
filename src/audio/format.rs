//! PCM sample formats carried on the wire and between pipeline stages

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Interleaved little-endian PCM sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit
    #[value(name = "s16le")]
    S16Le,
    /// 32-bit float in [-1.0, 1.0]
    #[value(name = "f32le")]
    F32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }

    /// Wire identifier
    pub fn id(self) -> u8 {
        match self {
            SampleFormat::S16Le => 1,
            SampleFormat::F32Le => 2,
        }
    }

    /// Append one sample given as f32 in [-1.0, 1.0]
    pub fn put_sample(self, buf: &mut BytesMut, value: f32) {
        match self {
            SampleFormat::S16Le => {
                let clamped = value.clamp(-1.0, 1.0);
                buf.put_i16_le((clamped * i16::MAX as f32) as i16);
            }
            SampleFormat::F32Le => buf.put_f32_le(value),
        }
    }
}

impl TryFrom<u8> for SampleFormat {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(SampleFormat::S16Le),
            2 => Ok(SampleFormat::F32Le),
            other => Err(ProtocolError::UnknownFormat(other)),
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleFormat::S16Le => write!(f, "s16le"),
            SampleFormat::F32Le => write!(f, "f32le"),
        }
    }
}

/// Decode little-endian i16 PCM bytes into `out`, replacing its contents
pub fn read_i16_samples(bytes: &[u8], out: &mut Vec<i16>) {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]])),
    );
}

/// Decode little-endian f32 PCM bytes into `out`, replacing its contents
pub fn read_f32_samples(bytes: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );
}
