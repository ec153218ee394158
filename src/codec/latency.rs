//! Encode/decode round-trip measurement
//!
//! A single click is pushed through an encoder and a decoder wired back to
//! back. The distance between the click and the loudest decoded sample is
//! the codec's algorithmic delay; wall-clock time spent in each half gives
//! the processing cost.

use bytes::BytesMut;
use std::time::{Duration, Instant};

use crate::audio::format::{read_f32_samples, read_i16_samples};
use crate::audio::SampleFormat;
use crate::codec::{open_decoder, open_encoder};
use crate::error::CodecError;
use crate::protocol::StreamParams;

/// Amplitude of the click, below full scale to avoid clipping on decode
const CLICK_LEVEL: f32 = 0.9;

/// Result of one [`measure_round_trip`] run
#[derive(Debug, Clone)]
pub struct LatencyReport {
    pub params: StreamParams,
    pub bitrate: u32,
    pub frames_encoded: usize,
    pub encoded_bytes: usize,
    pub encode_time: Duration,
    pub decode_time: Duration,
    /// Samples per channel between the click and its decoded peak
    pub delay_samples: Option<usize>,
}

impl LatencyReport {
    /// Algorithmic delay, `None` when the click never came back
    pub fn delay(&self) -> Option<Duration> {
        self.delay_samples.map(|samples| {
            Duration::from_secs_f64(samples as f64 / self.params.sample_rate as f64)
        })
    }

    /// Audio duration pushed through the codec
    pub fn audio_duration(&self) -> Duration {
        self.params.codec.frame_duration() * self.frames_encoded as u32
    }

    pub fn average_packet_size(&self) -> f64 {
        if self.frames_encoded == 0 {
            return 0.0;
        }
        self.encoded_bytes as f64 / self.frames_encoded as f64
    }

    /// How many times faster than real time the round trip runs
    pub fn realtime_factor(&self) -> f64 {
        let busy = (self.encode_time + self.decode_time).as_secs_f64();
        if busy == 0.0 {
            return f64::INFINITY;
        }
        self.audio_duration().as_secs_f64() / busy
    }
}

impl std::fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {} kbit/s: ", self.params, self.bitrate / 1000)?;
        match self.delay() {
            Some(delay) => write!(
                f,
                "delay {:.2} ms ({} samples)",
                delay.as_secs_f64() * 1000.0,
                self.delay_samples.unwrap_or_default()
            )?,
            None => write!(f, "delay unknown")?,
        }
        write!(
            f,
            ", {} frames, {:.1} B/frame, encode {:?}, decode {:?}, {:.0}x real time",
            self.frames_encoded,
            self.average_packet_size(),
            self.encode_time,
            self.decode_time,
            self.realtime_factor()
        )
    }
}

/// Run `frames` codec frames through a fresh encoder/decoder pair.
///
/// At least three frames are used so the click sits clear of the codec's
/// start-up and still has a full frame behind it.
pub fn measure_round_trip(
    params: &StreamParams,
    bitrate: u32,
    frames: usize,
) -> Result<LatencyReport, CodecError> {
    let frames = frames.max(3);
    let mut encoder = open_encoder(params, bitrate)?;
    let mut decoder = open_decoder(params)?;

    let frame_size = params.codec.frame_size(params.sample_rate);
    let channels = params.channels as usize;
    let click_at = frame_size + frame_size / 2;

    let mut report = LatencyReport {
        params: *params,
        bitrate,
        frames_encoded: 0,
        encoded_bytes: 0,
        encode_time: Duration::ZERO,
        decode_time: Duration::ZERO,
        delay_samples: None,
    };

    let mut pcm = BytesMut::with_capacity(encoder.frame_bytes());
    let mut peak = PeakTracker::default();
    let mut decoded_i16 = Vec::new();
    let mut decoded_f32 = Vec::new();

    for index in 0..frames {
        pcm.clear();
        let first = index * frame_size;
        for instant in first..first + frame_size {
            let value = if instant == click_at { CLICK_LEVEL } else { 0.0 };
            for _ in 0..channels {
                params.format.put_sample(&mut pcm, value);
            }
        }

        let started = Instant::now();
        let chunk = encoder.encode(&pcm)?;
        report.encode_time += started.elapsed();
        report.frames_encoded += 1;
        report.encoded_bytes += chunk.len();

        let started = Instant::now();
        let frame = decoder.decode(&chunk.data)?;
        report.decode_time += started.elapsed();

        // First channel only
        match params.format {
            SampleFormat::S16Le => {
                read_i16_samples(frame.as_bytes(), &mut decoded_i16);
                for sample in decoded_i16.iter().step_by(channels) {
                    peak.observe(*sample as f32 / i16::MAX as f32);
                }
            }
            SampleFormat::F32Le => {
                read_f32_samples(frame.as_bytes(), &mut decoded_f32);
                for sample in decoded_f32.iter().step_by(channels) {
                    peak.observe(*sample);
                }
            }
        }
    }

    report.delay_samples = peak
        .position()
        .and_then(|position| position.checked_sub(click_at));

    tracing::debug!("{}", report);
    Ok(report)
}

/// Loudest sample seen so far and where it was
#[derive(Default)]
struct PeakTracker {
    seen: usize,
    loudest: f32,
    at: Option<usize>,
}

impl PeakTracker {
    fn observe(&mut self, sample: f32) {
        let level = sample.abs();
        if level > self.loudest {
            self.loudest = level;
            self.at = Some(self.seen);
        }
        self.seen += 1;
    }

    fn position(&self) -> Option<usize> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;

    #[test]
    fn test_click_comes_back_delayed() {
        for kind in [CodecKind::LowLatency, CodecKind::HighFidelity] {
            let params = StreamParams::new(kind, SampleFormat::S16Le, 2, 48000);
            let report = measure_round_trip(&params, 128_000, 10).unwrap();

            assert_eq!(report.frames_encoded, 10);
            assert!(report.encoded_bytes > 0);
            let delay = report.delay_samples.expect("click lost");
            assert!(delay < 2 * kind.frame_size(48000), "{}: {}", kind, delay);
        }
    }

    #[test]
    fn test_frame_count_has_a_floor() {
        let params = StreamParams::new(CodecKind::LowLatency, SampleFormat::F32Le, 1, 48000);
        let report = measure_round_trip(&params, 64_000, 0).unwrap();
        assert_eq!(report.frames_encoded, 3);
        assert_eq!(report.audio_duration(), Duration::from_millis(30));
    }

    #[test]
    fn test_peak_tracker_keeps_first_maximum() {
        let mut peak = PeakTracker::default();
        for sample in [0.0, 0.2, -0.7, 0.7, 0.1] {
            peak.observe(sample);
        }
        assert_eq!(peak.position(), Some(2));
        assert_eq!(PeakTracker::default().position(), None);
    }
}
