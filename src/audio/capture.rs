//! Audio capture from input devices
//!
//! The cpal input stream lives on its own thread and pushes every callback's
//! samples into a [`CaptureBridge`]; the sender pipeline pulls them back out
//! with a blocking [`CaptureSource::read_chunk`].

use bytes::{BufMut, Bytes, BytesMut};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::bridge::{BridgeNotifier, BridgeState, CaptureBridge};
use crate::audio::device::find_input_device;
use crate::audio::format::SampleFormat;
use crate::error::AudioError;

/// How long the device gets to start delivering before open fails
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything the sender pipeline can pull PCM chunks from.
///
/// Chunks are interleaved PCM in the source's sample format and may be any
/// size; the pipeline regroups them into codec frames.
pub trait CaptureSource {
    /// Block until the next chunk is available.
    ///
    /// [`AudioError::EndOfStream`] and [`AudioError::Cancelled`] end the
    /// stream normally; any other error is a capture failure.
    fn read_chunk(&mut self) -> Result<Bytes, AudioError>;

    /// Release the backend once the stream has ended
    fn close(&mut self) {}
}

impl CaptureSource for CaptureBridge {
    fn read_chunk(&mut self) -> Result<Bytes, AudioError> {
        self.read_next_chunk()
    }
}

/// Capture settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Input device name, `None` for the default device
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
    pub format: SampleFormat,
}

/// Live capture from a cpal input device
pub struct AudioCapture {
    config: CaptureConfig,
    bridge: CaptureBridge,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioCapture {
    /// Open the device and wait until it delivers data
    pub fn open(config: CaptureConfig) -> Result<Self, AudioError> {
        // One second of backend-side buffering
        let max_queued = config.sample_rate as usize
            * config.channels as usize
            * config.format.bytes_per_sample();
        let bridge = CaptureBridge::new(max_queued);
        let running = Arc::new(AtomicBool::new(true));

        let notifier = bridge.notifier();
        let thread_config = config.clone();
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || run_stream(thread_config, notifier, thread_running))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut capture = Self {
            config,
            bridge,
            running,
            thread_handle: Some(handle),
        };

        if let Err(e) = capture.bridge.wait_until_ready(OPEN_TIMEOUT) {
            capture.stop();
            return Err(e);
        }

        tracing::info!(
            "Capture started: {} Hz, {} channels, {}",
            capture.config.sample_rate,
            capture.config.channels,
            capture.config.format
        );
        Ok(capture)
    }

    /// Reader handle, e.g. to cancel a blocked read from another thread
    pub fn bridge(&self) -> &CaptureBridge {
        &self.bridge
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Stop capturing and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl CaptureSource for AudioCapture {
    fn read_chunk(&mut self) -> Result<Bytes, AudioError> {
        self.bridge.read_next_chunk()
    }

    fn close(&mut self) {
        self.stop();
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread: owns the cpal stream for its whole life
fn run_stream(config: CaptureConfig, notifier: BridgeNotifier, running: Arc<AtomicBool>) {
    let device = match find_input_device(config.device.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            notifier.fail(e.to_string());
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: config.channels as u16,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_notifier = notifier.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Capture stream error: {}", err);
        err_notifier.fail(err.to_string());
    };

    let data_notifier = notifier.clone();
    let stream = match config.format {
        SampleFormat::S16Le => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut buf = BytesMut::with_capacity(data.len() * 2);
                for sample in data {
                    buf.put_i16_le(*sample);
                }
                data_notifier.push_data(buf.freeze());
            },
            err_fn,
            None,
        ),
        SampleFormat::F32Le => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buf = BytesMut::with_capacity(data.len() * 4);
                for sample in data {
                    buf.put_f32_le(*sample);
                }
                data_notifier.push_data(buf.freeze());
            },
            err_fn,
            None,
        ),
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to build capture stream: {}", e);
            notifier.fail(e.to_string());
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!("Failed to start capture stream: {}", e);
        notifier.fail(e.to_string());
        return;
    }

    notifier.set_state(BridgeState::Ready);

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
    notifier.set_state(BridgeState::Terminated);
}
