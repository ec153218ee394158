//! Audio subsystem module

pub mod bridge;
pub mod buffer;
pub mod capture;
pub mod device;
pub mod format;
pub mod playback;
pub mod tone;

pub use bridge::{BridgeNotifier, BridgeState, CaptureBridge};
pub use buffer::{AudioFrame, FrameRing};
pub use capture::{AudioCapture, CaptureConfig, CaptureSource};
pub use device::{list_devices, DeviceInfo};
pub use format::SampleFormat;
pub use playback::{CpalPlayback, PlaybackConfig, PlaybackSink};
pub use tone::ToneSource;
