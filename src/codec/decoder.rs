//! Opus decoder adapter

use bytes::{BufMut, BytesMut};
use opus::Decoder;

use crate::audio::{AudioFrame, SampleFormat};
use crate::codec::{opus_channels, FrameDecoder, SUPPORTED_SAMPLE_RATES};
use crate::error::CodecError;
use crate::protocol::StreamParams;

/// Longest frame libopus can return, in milliseconds
const MAX_FRAME_MS: usize = 120;

/// Opus decoder bound to one stream's parameters
pub struct OpusDecoder {
    decoder: Decoder,
    params: StreamParams,
    /// Scratch buffers sized for the longest possible frame
    decode_i16: Vec<i16>,
    decode_f32: Vec<f32>,
}

impl OpusDecoder {
    pub fn new(params: &StreamParams) -> Result<Self, CodecError> {
        let channels = opus_channels(params.channels).ok_or_else(|| {
            CodecError::DecoderInit(format!("Unsupported channel count: {}", params.channels))
        })?;
        if !SUPPORTED_SAMPLE_RATES.contains(&params.sample_rate) {
            return Err(CodecError::DecoderInit(format!(
                "Unsupported sample rate: {}",
                params.sample_rate
            )));
        }

        let decoder = Decoder::new(params.sample_rate, channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        let max_samples =
            params.sample_rate as usize * MAX_FRAME_MS / 1000 * params.channels as usize;
        let (decode_i16, decode_f32) = match params.format {
            SampleFormat::S16Le => (vec![0i16; max_samples], Vec::new()),
            SampleFormat::F32Le => (Vec::new(), vec![0f32; max_samples]),
        };

        Ok(Self {
            decoder,
            params: *params,
            decode_i16,
            decode_f32,
        })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<AudioFrame, CodecError> {
        let channels = self.params.channels as usize;

        let result = match self.params.format {
            SampleFormat::S16Le => self
                .decoder
                .decode(payload, &mut self.decode_i16, false)
                .map(|frames| {
                    let mut buf = BytesMut::with_capacity(frames * channels * 2);
                    for sample in &self.decode_i16[..frames * channels] {
                        buf.put_i16_le(*sample);
                    }
                    buf
                }),
            SampleFormat::F32Le => self
                .decoder
                .decode_float(payload, &mut self.decode_f32, false)
                .map(|frames| {
                    let mut buf = BytesMut::with_capacity(frames * channels * 4);
                    for sample in &self.decode_f32[..frames * channels] {
                        buf.put_f32_le(*sample);
                    }
                    buf
                }),
        };

        let buf = result.map_err(|e| CodecError::DecodingFailed(e.to_string()))?;
        Ok(AudioFrame::new(
            buf.freeze(),
            self.params.format,
            self.params.channels,
            self.params.sample_rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecKind, FrameEncoder, OpusEncoder};

    #[test]
    fn test_encode_decode_sine() {
        let params = StreamParams::new(CodecKind::HighFidelity, SampleFormat::S16Le, 2, 48000);
        let mut encoder = OpusEncoder::new(&params, 128_000, true).unwrap();
        let mut decoder = OpusDecoder::new(&params).unwrap();

        let mut pcm = Vec::with_capacity(encoder.frame_bytes());
        for i in 0..encoder.frame_size() {
            let t = i as f32 / 48000.0;
            let val = ((t * 440.0 * std::f32::consts::TAU).sin() * 16000.0) as i16;
            pcm.extend_from_slice(&val.to_le_bytes()); // Left
            pcm.extend_from_slice(&val.to_le_bytes()); // Right
        }

        let encoded = encoder.encode(&pcm).unwrap();
        let frame = decoder.decode(&encoded.data).unwrap();

        assert_eq!(frame.frame_count(), encoder.frame_size());
        assert_eq!(frame.as_bytes().len(), pcm.len());
    }

    #[test]
    fn test_corrupt_payload_keeps_decoder_usable() {
        let params = StreamParams::new(CodecKind::LowLatency, SampleFormat::F32Le, 2, 48000);
        let mut encoder = OpusEncoder::new(&params, 96_000, false).unwrap();
        let mut decoder = OpusDecoder::new(&params).unwrap();

        // TOC byte announcing code 3 with a frame count of zero is invalid
        assert!(matches!(
            decoder.decode(&[0xFF, 0x00]),
            Err(CodecError::DecodingFailed(_))
        ));

        let encoded = encoder.encode(&vec![0u8; encoder.frame_bytes()]).unwrap();
        assert_eq!(decoder.decode(&encoded.data).unwrap().frame_count(), 480);
    }
}
