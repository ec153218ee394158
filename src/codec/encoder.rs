//! Opus encoder adapter

use bytes::Bytes;
use opus::{Bitrate, Encoder};

use crate::audio::format::{read_f32_samples, read_i16_samples};
use crate::audio::SampleFormat;
use crate::codec::{opus_channels, CodecKind, EncodedChunk, FrameEncoder, SUPPORTED_SAMPLE_RATES};
use crate::constants::MAX_ENCODED_CHUNK;
use crate::error::CodecError;
use crate::protocol::StreamParams;

/// Opus encoder configured for one stream
pub struct OpusEncoder {
    encoder: Encoder,
    params: StreamParams,
    frame_size: usize,
    /// Scratch buffers sized from the stream parameters
    pcm_i16: Vec<i16>,
    pcm_f32: Vec<f32>,
    encode_buffer: Vec<u8>,
}

impl OpusEncoder {
    /// Create an encoder; `vbr` selects unconstrained variable bitrate
    pub fn new(params: &StreamParams, bitrate: u32, vbr: bool) -> Result<Self, CodecError> {
        let channels = opus_channels(params.channels).ok_or_else(|| {
            CodecError::EncoderInit(format!("Unsupported channel count: {}", params.channels))
        })?;
        if !SUPPORTED_SAMPLE_RATES.contains(&params.sample_rate) {
            return Err(CodecError::EncoderInit(format!(
                "Unsupported sample rate: {}",
                params.sample_rate
            )));
        }

        let mut encoder = Encoder::new(params.sample_rate, channels, params.codec.application())
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        encoder
            .set_vbr(vbr)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;
        if vbr {
            encoder
                .set_vbr_constraint(false)
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set CVBR: {}", e)))?;
        }

        let frame_size = params.codec.frame_size(params.sample_rate);
        let samples = frame_size * params.channels as usize;

        tracing::debug!(
            "Opus encoder ready: {}, {} Hz, {} channels, {} samples/frame, {} bit/s",
            params.codec,
            params.sample_rate,
            params.channels,
            frame_size,
            bitrate
        );

        Ok(Self {
            encoder,
            params: *params,
            frame_size,
            pcm_i16: Vec::with_capacity(samples),
            pcm_f32: Vec::with_capacity(samples),
            encode_buffer: vec![0u8; MAX_ENCODED_CHUNK],
        })
    }

    /// Samples per channel in one frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl FrameEncoder for OpusEncoder {
    fn kind(&self) -> CodecKind {
        self.params.codec
    }

    fn frame_bytes(&self) -> usize {
        self.frame_size * self.params.frame_bytes()
    }

    fn encode(&mut self, pcm: &[u8]) -> Result<EncodedChunk, CodecError> {
        if pcm.len() != self.frame_bytes() {
            return Err(CodecError::InvalidFrameSize(pcm.len()));
        }

        let size = match self.params.format {
            SampleFormat::S16Le => {
                read_i16_samples(pcm, &mut self.pcm_i16);
                self.encoder.encode(&self.pcm_i16, &mut self.encode_buffer)
            }
            SampleFormat::F32Le => {
                read_f32_samples(pcm, &mut self.pcm_f32);
                self.encoder.encode_float(&self.pcm_f32, &mut self.encode_buffer)
            }
        }
        .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        Ok(EncodedChunk {
            codec: self.params.codec,
            data: Bytes::copy_from_slice(&self.encode_buffer[..size]),
        })
    }
}
