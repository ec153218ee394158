//! Receiver-side stream sessions

use std::time::Duration;

use crate::audio::{CpalPlayback, PlaybackConfig, PlaybackSink};
use crate::codec::{open_decoder, FrameDecoder};
use crate::error::Result;
use crate::protocol::{Depacketizer, Packet, StreamParams};

/// Decoder and playback sink bound to one set of stream parameters.
///
/// Dropping the session closes both.
pub struct StreamSession {
    params: StreamParams,
    decoder: Box<dyn FrameDecoder>,
    sink: Box<dyn PlaybackSink>,
    depacketizer: Depacketizer,
    frames_played: u64,
}

impl StreamSession {
    pub fn new(
        params: StreamParams,
        decoder: Box<dyn FrameDecoder>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        Self {
            params,
            decoder,
            sink,
            depacketizer: Depacketizer::new(),
            frames_played: 0,
        }
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    /// Chunks lost to missing fragments
    pub fn dropped_chunks(&self) -> u64 {
        self.depacketizer.dropped_chunks()
    }

    /// Feed one data packet. Once a chunk completes it is decoded and written
    /// to the sink; returns the frames written.
    ///
    /// A decode error drops only that chunk; the session stays usable.
    pub fn handle_data(&mut self, packet: &Packet<'_>) -> Result<usize> {
        let Some(chunk) = self.depacketizer.push(packet) else {
            return Ok(0);
        };

        let frame = self.decoder.decode(&chunk)?;
        let frames = self.sink.write(frame.as_bytes())?;
        self.frames_played += frames as u64;
        Ok(frames)
    }
}

/// Builds sessions for newly announced stream parameters
pub trait SessionFactory {
    fn open_session(&mut self, params: &StreamParams) -> Result<StreamSession>;
}

/// Opens the stream's codec and a cpal output device
pub struct DeviceSessionFactory {
    device: Option<String>,
    prebuffer: Duration,
}

impl DeviceSessionFactory {
    pub fn new(device: Option<String>, prebuffer: Duration) -> Self {
        Self { device, prebuffer }
    }
}

impl SessionFactory for DeviceSessionFactory {
    fn open_session(&mut self, params: &StreamParams) -> Result<StreamSession> {
        let decoder = open_decoder(params)?;
        let playback = CpalPlayback::open(PlaybackConfig {
            device: self.device.clone(),
            sample_rate: params.sample_rate,
            channels: params.channels,
            format: params.format,
            prebuffer: self.prebuffer,
        })?;

        Ok(StreamSession::new(*params, decoder, Box::new(playback)))
    }
}
