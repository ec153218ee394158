//! Synthetic sine source for running the sender without an input device

use bytes::{Bytes, BytesMut};
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use crate::audio::capture::CaptureSource;
use crate::audio::format::SampleFormat;
use crate::error::AudioError;

/// Generates a sine tone in fixed-size chunks.
///
/// With pacing enabled each chunk is released no earlier than its real-time
/// position, so downstream sees the same rate a sound card would produce.
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u8,
    format: SampleFormat,
    chunk_frames: usize,
    /// Stop after this many frames
    limit: Option<u64>,
    paced: bool,
    frames_generated: u64,
    started: Option<Instant>,
}

impl ToneSource {
    pub fn new(
        frequency: f32,
        sample_rate: u32,
        channels: u8,
        format: SampleFormat,
        chunk_frames: usize,
    ) -> Self {
        Self {
            frequency,
            amplitude: 0.5,
            sample_rate,
            channels,
            format,
            chunk_frames: chunk_frames.max(1),
            limit: None,
            paced: false,
            frames_generated: 0,
            started: None,
        }
    }

    /// End the stream after `duration` of audio
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.limit = Some((duration.as_secs_f64() * self.sample_rate as f64).round() as u64);
        self
    }

    /// Release chunks at the real-time rate
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames_generated
    }
}

impl CaptureSource for ToneSource {
    fn read_chunk(&mut self) -> Result<Bytes, AudioError> {
        let mut frames = self.chunk_frames as u64;
        if let Some(limit) = self.limit {
            frames = frames.min(limit.saturating_sub(self.frames_generated));
            if frames == 0 {
                return Err(AudioError::EndOfStream);
            }
        }

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = Duration::from_secs_f64(self.frames_generated as f64 / self.sample_rate as f64);
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }

        let mut buf = BytesMut::with_capacity(
            frames as usize * self.channels as usize * self.format.bytes_per_sample(),
        );
        for i in 0..frames {
            let t = (self.frames_generated + i) as f32 / self.sample_rate as f32;
            let value = (t * self.frequency * TAU).sin() * self.amplitude;
            for _ in 0..self.channels {
                self.format.put_sample(&mut buf, value);
            }
        }

        self.frames_generated += frames;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_tone_chunks() {
        let mut tone = ToneSource::new(440.0, 48000, 2, SampleFormat::S16Le, 441)
            .with_duration(Duration::from_millis(10));

        let first = tone.read_chunk().unwrap();
        assert_eq!(first.len(), 441 * 2 * 2);

        // 480 frames total: the second chunk is the 39 frame remainder
        let second = tone.read_chunk().unwrap();
        assert_eq!(second.len(), 39 * 2 * 2);

        assert!(matches!(tone.read_chunk(), Err(AudioError::EndOfStream)));
        assert_eq!(tone.frames_generated(), 480);
    }

    #[test]
    fn test_tone_is_not_silent() {
        let mut tone = ToneSource::new(1000.0, 48000, 1, SampleFormat::F32Le, 48);
        let chunk = tone.read_chunk().unwrap();

        let mut samples = Vec::new();
        crate::audio::format::read_f32_samples(&chunk, &mut samples);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
        assert!(samples.iter().all(|s| s.abs() <= 0.5));
    }
}
