//! Sender and receiver pipelines joined by an in-memory link

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use lan_audio_link::{
    audio::{PlaybackSink, SampleFormat, ToneSource},
    codec::{open_decoder, CodecKind},
    error::AudioError,
    network::{
        DatagramSink, PacketSource, ReceiverPipeline, ReceiverState, SenderPipeline,
        SessionFactory, StreamSession,
    },
    protocol::StreamParams,
    Shutdown,
};

#[derive(Clone, Default)]
struct Link(Arc<Mutex<VecDeque<Vec<u8>>>>);

impl Link {
    fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl DatagramSink for Link {
    fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
        self.0.lock().push_back(datagram.to_vec());
        Ok(datagram.len())
    }
}

impl PacketSource for Link {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let queue = self.0.lock();
        let front = queue.front().ok_or(io::ErrorKind::WouldBlock)?;
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let front = self.0.lock().pop_front().ok_or(io::ErrorKind::WouldBlock)?;
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        Ok(n)
    }
}

/// Counts frames handed to playback
struct CountingSink {
    frame_bytes: usize,
    played: Arc<Mutex<u64>>,
}

impl PlaybackSink for CountingSink {
    fn write(&mut self, pcm: &[u8]) -> Result<usize, AudioError> {
        assert_eq!(pcm.len() % self.frame_bytes, 0);
        let frames = pcm.len() / self.frame_bytes;
        *self.played.lock() += frames as u64;
        Ok(frames)
    }
}

/// Real decoder, counting sink
#[derive(Default)]
struct CountingFactory {
    played: Arc<Mutex<u64>>,
}

impl SessionFactory for CountingFactory {
    fn open_session(&mut self, params: &StreamParams) -> lan_audio_link::Result<StreamSession> {
        Ok(StreamSession::new(
            *params,
            open_decoder(params)?,
            Box::new(CountingSink {
                frame_bytes: params.frame_bytes(),
                played: self.played.clone(),
            }),
        ))
    }
}

fn stream_one_second(codec: CodecKind, format: SampleFormat, channels: u8) {
    let params = StreamParams::new(codec, format, channels, 48000);
    let link = Link::default();

    let tone = ToneSource::new(440.0, 48000, channels, format, 441)
        .with_duration(Duration::from_secs(1));
    let mut sender =
        SenderPipeline::new(tone, link.clone(), params, 128_000, Shutdown::new()).unwrap();
    let sent = sender.run().unwrap();
    assert!(sent.frames_encoded > 0);
    assert_eq!(sent.send_errors, 0);

    let factory = CountingFactory::default();
    let played = factory.played.clone();
    let mut receiver = ReceiverPipeline::new(link.clone(), factory, Shutdown::new());
    while !link.is_empty() {
        receiver.poll_once();
    }

    let captured = 48_000i64;
    let played = *played.lock() as i64;
    let codec_frame = codec.frame_size(48000) as i64;
    assert!(
        (captured - played).abs() <= codec_frame,
        "{}: captured {} frames, played {}",
        codec,
        captured,
        played
    );

    let stats = receiver.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.decode_errors, 0);
    assert_eq!(stats.sequence_gaps, 0);
    assert_eq!(receiver.state(), ReceiverState::Waiting);
}

#[test]
fn low_latency_tone_plays_every_frame() {
    stream_one_second(CodecKind::LowLatency, SampleFormat::S16Le, 2);
}

#[test]
fn high_fidelity_tone_plays_every_frame() {
    stream_one_second(CodecKind::HighFidelity, SampleFormat::F32Le, 2);
}

#[test]
fn mono_stream() {
    stream_one_second(CodecKind::LowLatency, SampleFormat::F32Le, 1);
}

