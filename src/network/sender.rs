//! Sender pipeline: capture → ring → encode → packetize → transmit

use std::time::{Duration, Instant};

use crate::audio::{CaptureSource, FrameRing};
use crate::codec::{open_encoder, FrameEncoder};
use crate::constants::{RING_BUFFER_SECONDS, STATS_INTERVAL_SECS};
use crate::error::{AudioError, NetworkError, Result};
use crate::network::transport::DatagramSink;
use crate::protocol::{Packetizer, StreamParams};
use crate::Shutdown;

/// Sender lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Streaming,
    Stopped,
}

/// Sender statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub chunks_captured: u64,
    pub frames_encoded: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub encode_errors: u64,
    /// Capture chunks rejected because the ring was full
    pub ring_overruns: u64,
}

/// Streams one capture source to one receiver
pub struct SenderPipeline<C, T> {
    capture: C,
    transport: T,
    encoder: Box<dyn FrameEncoder>,
    packetizer: Packetizer,
    ring: FrameRing,
    shutdown: Shutdown,
    state: SenderState,
    stats: SenderStats,
}

impl<C: CaptureSource, T: DatagramSink> SenderPipeline<C, T> {
    /// Build the pipeline with the codec `params` selects
    pub fn new(
        capture: C,
        transport: T,
        params: StreamParams,
        bitrate: u32,
        shutdown: Shutdown,
    ) -> Result<Self> {
        params.validate()?;
        let encoder = open_encoder(&params, bitrate)?;
        Ok(Self::with_encoder(capture, transport, params, encoder, shutdown))
    }

    /// Build the pipeline around an existing encoder
    pub fn with_encoder(
        capture: C,
        transport: T,
        params: StreamParams,
        encoder: Box<dyn FrameEncoder>,
        shutdown: Shutdown,
    ) -> Self {
        let ring = FrameRing::for_audio(
            RING_BUFFER_SECONDS,
            params.sample_rate,
            params.channels,
            params.format,
        );

        Self {
            capture,
            transport,
            encoder,
            packetizer: Packetizer::new(params),
            ring,
            shutdown,
            state: SenderState::Idle,
            stats: SenderStats::default(),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Stream until shutdown, end of capture, or a capture failure.
    ///
    /// Failing to send the start packet is fatal. A stop packet is sent on
    /// every exit after streaming began, including capture failures, which
    /// are then returned.
    pub fn run(&mut self) -> Result<SenderStats> {
        let start = self.packetizer.start_packet();
        self.transport
            .send_datagram(&start)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        self.state = SenderState::Streaming;
        tracing::info!("Streaming started: {}", self.packetizer.params());

        let mut last_stats = Instant::now();
        let outcome = loop {
            if self.shutdown.is_triggered() {
                tracing::info!("Shutdown requested");
                break Ok(());
            }

            match self.capture.read_chunk() {
                Ok(chunk) => self.process_chunk(&chunk),
                Err(AudioError::EndOfStream) => {
                    tracing::info!("Capture reached end of stream");
                    break Ok(());
                }
                Err(AudioError::Cancelled) => break Ok(()),
                Err(e) => {
                    tracing::error!("Capture failed: {}", e);
                    break Err(e);
                }
            }

            if last_stats.elapsed() >= Duration::from_secs(STATS_INTERVAL_SECS) {
                last_stats = Instant::now();
                self.log_stats();
            }
        };

        self.stop();
        outcome?;
        Ok(self.stats)
    }

    fn process_chunk(&mut self, chunk: &[u8]) {
        self.stats.chunks_captured += 1;

        if let Err(e) = self.ring.write(chunk) {
            self.stats.ring_overruns += 1;
            tracing::warn!("Dropping capture chunk: {}", e);
        }

        let frame_bytes = self.encoder.frame_bytes();
        while let Some(frame) = self.ring.read_frame(frame_bytes) {
            let encoded = match self.encoder.encode(frame) {
                Ok(encoded) => encoded,
                Err(e) => {
                    self.stats.encode_errors += 1;
                    tracing::warn!("Encoding failed: {}", e);
                    continue;
                }
            };
            self.stats.frames_encoded += 1;

            for packet in self.packetizer.packetize(&encoded.data) {
                match self.transport.send_datagram(&packet) {
                    Ok(sent) => {
                        self.stats.packets_sent += 1;
                        self.stats.bytes_sent += sent as u64;
                    }
                    Err(e) => {
                        // Remaining fragments of this chunk are useless now
                        self.stats.send_errors += 1;
                        tracing::warn!("Failed to send packet: {}", e);
                        break;
                    }
                }
            }
        }
    }

    fn stop(&mut self) {
        let stop = self.packetizer.stop_packet();
        if let Err(e) = self.transport.send_datagram(&stop) {
            tracing::warn!("Failed to send stop packet: {}", e);
        }

        self.capture.close();
        self.ring.clear();
        self.state = SenderState::Stopped;

        tracing::info!("Streaming stopped");
        self.log_stats();
    }

    fn log_stats(&self) {
        let stats = &self.stats;
        tracing::info!(
            "Sender stats: {} frames encoded, {} packets sent, {:.1} KB sent, {} send errors, {} ring overruns",
            stats.frames_encoded,
            stats.packets_sent,
            stats.bytes_sent as f64 / 1024.0,
            stats.send_errors,
            stats.ring_overruns
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SampleFormat, ToneSource};
    use crate::codec::{CodecKind, EncodedChunk};
    use crate::error::{CodecError, Error};
    use crate::network::transport::testing::MemoryLink;
    use crate::protocol::{flags, Packet, PacketKind, MAX_PAYLOAD_SIZE};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn params() -> StreamParams {
        StreamParams::new(CodecKind::LowLatency, SampleFormat::S16Le, 2, 48000)
    }

    /// Emits `output_len` bytes per `frame_bytes` of input
    struct FixedEncoder {
        frame_bytes: usize,
        output_len: usize,
    }

    impl FrameEncoder for FixedEncoder {
        fn kind(&self) -> CodecKind {
            CodecKind::LowLatency
        }

        fn frame_bytes(&self) -> usize {
            self.frame_bytes
        }

        fn encode(&mut self, pcm: &[u8]) -> std::result::Result<EncodedChunk, CodecError> {
            assert_eq!(pcm.len(), self.frame_bytes);
            Ok(EncodedChunk {
                codec: CodecKind::LowLatency,
                data: Bytes::from(vec![0xAB; self.output_len]),
            })
        }
    }

    /// Yields queued results, then end of stream
    struct ScriptedSource(VecDeque<std::result::Result<Bytes, AudioError>>);

    impl CaptureSource for ScriptedSource {
        fn read_chunk(&mut self) -> std::result::Result<Bytes, AudioError> {
            self.0.pop_front().unwrap_or(Err(AudioError::EndOfStream))
        }
    }

    fn kinds(link: &MemoryLink) -> Vec<PacketKind> {
        link.drain()
            .iter()
            .map(|d| Packet::parse(d).unwrap().header.kind)
            .collect()
    }

    #[test]
    fn test_start_data_stop() {
        let tone = ToneSource::new(440.0, 48000, 2, SampleFormat::S16Le, 441)
            .with_duration(Duration::from_millis(100));
        let link = MemoryLink::default();
        let mut sender =
            SenderPipeline::new(tone, link.clone(), params(), 128_000, Shutdown::new()).unwrap();
        assert_eq!(sender.state(), SenderState::Idle);

        let stats = sender.run().unwrap();
        assert_eq!(sender.state(), SenderState::Stopped);
        // 4800 frames → ten 10 ms codec frames
        assert_eq!(stats.frames_encoded, 10);
        assert_eq!(stats.packets_sent, 10);

        let packets = link.drain();
        let parsed: Vec<_> = packets.iter().map(|d| Packet::parse(d).unwrap()).collect();
        assert_eq!(parsed.first().unwrap().header.kind, PacketKind::Start);
        assert_eq!(parsed.last().unwrap().header.kind, PacketKind::Stop);
        assert!(parsed[1..parsed.len() - 1]
            .iter()
            .all(|p| p.header.kind == PacketKind::Data && p.header.params == params()));
        for (i, packet) in parsed.iter().enumerate() {
            assert_eq!(packet.header.sequence, i as u32);
        }
    }

    #[test]
    fn test_shutdown_before_first_chunk() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let tone = ToneSource::new(440.0, 48000, 2, SampleFormat::S16Le, 480);
        let link = MemoryLink::default();

        SenderPipeline::new(tone, link.clone(), params(), 128_000, shutdown)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(kinds(&link), vec![PacketKind::Start, PacketKind::Stop]);
    }

    #[test]
    fn test_capture_failure_still_sends_stop() {
        let source = ScriptedSource(VecDeque::from(vec![
            Ok(Bytes::from(vec![0u8; 8])),
            Err(AudioError::CaptureFailed("device unplugged".into())),
        ]));
        let link = MemoryLink::default();
        let encoder = Box::new(FixedEncoder {
            frame_bytes: 4,
            output_len: 10,
        });
        let mut sender =
            SenderPipeline::with_encoder(source, link.clone(), params(), encoder, Shutdown::new());

        let err = sender.run().unwrap_err();
        assert!(matches!(err, Error::Audio(AudioError::CaptureFailed(_))));
        assert_eq!(sender.state(), SenderState::Stopped);
        assert_eq!(
            kinds(&link),
            vec![
                PacketKind::Start,
                PacketKind::Data,
                PacketKind::Data,
                PacketKind::Stop
            ]
        );
    }

    #[test]
    fn test_large_chunk_is_fragmented() {
        let source = ScriptedSource(VecDeque::from(vec![Ok(Bytes::from(vec![0u8; 4]))]));
        let link = MemoryLink::default();
        let encoder = Box::new(FixedEncoder {
            frame_bytes: 4,
            output_len: 2 * MAX_PAYLOAD_SIZE + 1,
        });
        let mut sender =
            SenderPipeline::with_encoder(source, link.clone(), params(), encoder, Shutdown::new());
        sender.run().unwrap();

        let packets = link.drain();
        let data: Vec<_> = packets[1..packets.len() - 1]
            .iter()
            .map(|d| Packet::parse(d).unwrap())
            .collect();
        assert_eq!(data.len(), 3);
        assert!(data[0].header.has_flag(flags::MORE_FRAGMENTS));
        assert!(data[1].header.has_flag(flags::MORE_FRAGMENTS));
        assert!(!data[2].header.has_flag(flags::MORE_FRAGMENTS));
        assert_eq!(data[2].payload.len(), 1);
    }

    /// Fails exactly the `fail_at`-th send (zero based)
    struct FlakySink {
        inner: MemoryLink,
        sends: AtomicUsize,
        fail_at: usize,
    }

    impl DatagramSink for FlakySink {
        fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
            if self.sends.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            self.inner.send_datagram(datagram)
        }
    }

    #[test]
    fn test_send_failure_aborts_rest_of_chunk() {
        let source = ScriptedSource(VecDeque::from(vec![
            Ok(Bytes::from(vec![0u8; 4])),
            Ok(Bytes::from(vec![0u8; 4])),
        ]));
        let link = MemoryLink::default();
        let sink = FlakySink {
            inner: link.clone(),
            sends: AtomicUsize::new(0),
            // start, then the first fragment of chunk one
            fail_at: 1,
        };
        let encoder = Box::new(FixedEncoder {
            frame_bytes: 4,
            output_len: 2 * MAX_PAYLOAD_SIZE,
        });
        let mut sender =
            SenderPipeline::with_encoder(source, sink, params(), encoder, Shutdown::new());

        let stats = sender.run().unwrap();
        assert_eq!(stats.send_errors, 1);
        // chunk one lost entirely, chunk two sent as two fragments
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(
            kinds(&link),
            vec![
                PacketKind::Start,
                PacketKind::Data,
                PacketKind::Data,
                PacketKind::Stop
            ]
        );
    }

    #[test]
    fn test_start_failure_is_fatal() {
        let sink = FlakySink {
            inner: MemoryLink::default(),
            sends: AtomicUsize::new(0),
            fail_at: 0,
        };
        let tone = ToneSource::new(440.0, 48000, 2, SampleFormat::S16Le, 480);
        let mut sender =
            SenderPipeline::new(tone, sink, params(), 128_000, Shutdown::new()).unwrap();

        assert!(matches!(
            sender.run(),
            Err(Error::Network(NetworkError::SendFailed(_)))
        ));
        assert_eq!(sender.state(), SenderState::Idle);
    }

    #[test]
    fn test_ring_overrun_drops_chunk_and_continues() {
        let capacity = FrameRing::for_audio(RING_BUFFER_SECONDS, 48000, 2, SampleFormat::S16Le)
            .capacity();
        let source = ScriptedSource(VecDeque::from(vec![
            Ok(Bytes::from(vec![0u8; capacity + 4])),
            Ok(Bytes::from(vec![0u8; 8])),
        ]));
        let link = MemoryLink::default();
        let encoder = Box::new(FixedEncoder {
            frame_bytes: 4,
            output_len: 3,
        });
        let mut sender =
            SenderPipeline::with_encoder(source, link, params(), encoder, Shutdown::new());

        let stats = sender.run().unwrap();
        assert_eq!(stats.ring_overruns, 1);
        assert_eq!(stats.frames_encoded, 2);
    }
}
