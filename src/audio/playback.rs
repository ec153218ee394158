//! Audio playback to output devices
//!
//! Decoded PCM is queued by the receiver thread and drained by the cpal
//! output callback through a lock-free frame queue. Until `prebuffer` worth
//! of audio is queued (and again after every underrun) the callback plays
//! silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_output_device;
use crate::audio::format::SampleFormat;
use crate::error::AudioError;

const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds of audio the playback queue holds before dropping old data
const MAX_QUEUED_SECONDS: usize = 2;

/// Widest frame the queue carries
const MAX_CHANNELS: usize = 2;

/// Destination for decoded PCM
pub trait PlaybackSink {
    /// Queue interleaved PCM in the sink's format, returning frames accepted
    fn write(&mut self, pcm: &[u8]) -> Result<usize, AudioError>;
}

/// Playback settings for one stream
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Output device name, `None` for the default device
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
    pub format: SampleFormat,
    pub prebuffer: Duration,
}

impl PlaybackConfig {
    fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    fn frames(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64) as usize
    }
}

/// Sample types the output callback can be fed with
trait Sample: Copy + Default + Send + Sync + 'static {
    const BYTES: usize;

    fn from_le(bytes: &[u8]) -> Self;
}

impl Sample for i16 {
    const BYTES: usize = 2;

    fn from_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl Sample for f32 {
    const BYTES: usize = 4;

    fn from_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

type Frame<T> = [T; MAX_CHANNELS];

/// Frames waiting for the output callback.
///
/// The receiver thread pushes and the callback pops; neither side blocks.
/// A full queue overwrites its oldest frames.
struct PlaybackQueue<T> {
    frames: ArrayQueue<Frame<T>>,
    channels: usize,
    prebuffer_frames: usize,
    primed: AtomicBool,
    underruns: AtomicU64,
    overflows: AtomicU64,
}

impl<T: Sample> PlaybackQueue<T> {
    fn new(capacity: usize, channels: usize, prebuffer_frames: usize) -> Self {
        Self {
            frames: ArrayQueue::new(capacity.max(1)),
            channels: channels.clamp(1, MAX_CHANNELS),
            prebuffer_frames: prebuffer_frames.clamp(1, capacity.max(1)),
            primed: AtomicBool::new(false),
            underruns: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Queue whole frames of little-endian PCM
    fn push(&self, pcm: &[u8]) {
        let mut overflowed = false;
        for bytes in pcm.chunks_exact(self.channels * T::BYTES) {
            let mut frame = [T::default(); MAX_CHANNELS];
            for (slot, sample) in frame.iter_mut().zip(bytes.chunks_exact(T::BYTES)) {
                *slot = T::from_le(sample);
            }
            overflowed |= self.frames.force_push(frame).is_some();
        }
        if overflowed {
            self.overflows.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fill an interleaved output buffer, padding with silence
    fn fill(&self, out: &mut [T]) {
        if !self.primed.load(Ordering::Acquire) {
            if self.frames.len() < self.prebuffer_frames {
                out.fill(T::default());
                return;
            }
            self.primed.store(true, Ordering::Release);
        }

        let mut slots = out.chunks_mut(self.channels);
        for slot in slots.by_ref() {
            match self.frames.pop() {
                Some(frame) => slot.copy_from_slice(&frame[..slot.len()]),
                None => {
                    slot.fill(T::default());
                    self.primed.store(false, Ordering::Release);
                    self.underruns.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
        for slot in slots {
            slot.fill(T::default());
        }
    }

    fn xruns(&self) -> (u64, u64) {
        (
            self.underruns.load(Ordering::Relaxed),
            self.overflows.load(Ordering::Relaxed),
        )
    }
}

/// Queue handle shared with the output callback
#[derive(Clone)]
enum SharedQueue {
    S16(Arc<PlaybackQueue<i16>>),
    F32(Arc<PlaybackQueue<f32>>),
}

impl SharedQueue {
    fn new(config: &PlaybackConfig) -> Self {
        let capacity = config.sample_rate as usize * MAX_QUEUED_SECONDS;
        let channels = config.channels as usize;
        let prebuffer = config.frames(config.prebuffer);
        match config.format {
            SampleFormat::S16Le => {
                SharedQueue::S16(Arc::new(PlaybackQueue::new(capacity, channels, prebuffer)))
            }
            SampleFormat::F32Le => {
                SharedQueue::F32(Arc::new(PlaybackQueue::new(capacity, channels, prebuffer)))
            }
        }
    }

    fn push(&self, pcm: &[u8]) {
        match self {
            SharedQueue::S16(queue) => queue.push(pcm),
            SharedQueue::F32(queue) => queue.push(pcm),
        }
    }

    fn xruns(&self) -> (u64, u64) {
        match self {
            SharedQueue::S16(queue) => queue.xruns(),
            SharedQueue::F32(queue) => queue.xruns(),
        }
    }
}

/// Playback through a cpal output stream
pub struct CpalPlayback {
    config: PlaybackConfig,
    queue: SharedQueue,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
}

impl CpalPlayback {
    /// Open the output device and start the stream
    pub fn open(config: PlaybackConfig) -> Result<Self, AudioError> {
        let queue = SharedQueue::new(&config);
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let thread_config = config.clone();
        let thread_queue = queue.clone();
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                run_stream(thread_config, thread_queue, thread_running, ready_tx, error_tx)
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut playback = Self {
            config,
            queue,
            running,
            thread_handle: Some(handle),
            error_rx,
        };

        let started = ready_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or(Err(AudioError::Timeout));
        if let Err(e) = started {
            playback.stop();
            return Err(e);
        }

        tracing::info!(
            "Playback started: {} Hz, {} channels, {}, prebuffer {:?}",
            playback.config.sample_rate,
            playback.config.channels,
            playback.config.format,
            playback.config.prebuffer
        );
        Ok(playback)
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Underrun and overflow counts so far
    pub fn xruns(&self) -> (u64, u64) {
        self.queue.xruns()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            let (underruns, overflows) = self.xruns();
            tracing::debug!(
                "Playback stopped: {} underruns, {} overflows",
                underruns,
                overflows
            );
        }
    }
}

impl PlaybackSink for CpalPlayback {
    fn write(&mut self, pcm: &[u8]) -> Result<usize, AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        self.queue.push(pcm);
        Ok(pcm.len() / self.config.frame_bytes())
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_stream(
    config: PlaybackConfig,
    queue: SharedQueue,
    running: Arc<AtomicBool>,
    ready_tx: Sender<Result<(), AudioError>>,
    error_tx: Sender<AudioError>,
) {
    let device = match find_output_device(config.device.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: config.channels as u16,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = move |err: cpal::StreamError| {
        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
    };

    let stream = match queue {
        SharedQueue::S16(queue) => device.build_output_stream(
            &stream_config,
            move |out: &mut [i16], _: &cpal::OutputCallbackInfo| queue.fill(out),
            err_fn,
            None,
        ),
        SharedQueue::F32(queue) => device.build_output_stream(
            &stream_config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| queue.fill(out),
            err_fn,
            None,
        ),
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
}
