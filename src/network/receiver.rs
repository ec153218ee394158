//! Receiver pipeline: receive → validate → session (re)bind → decode → play

use std::time::{Duration, Instant};

use crate::constants::{MAX_PACKET_SIZE, STATS_INTERVAL_SECS};
use crate::error::Error;
use crate::network::session::{SessionFactory, StreamSession};
use crate::network::transport::{read_packet, PacketSource, ReadOutcome};
use crate::protocol::{Packet, PacketKind, StreamParams};
use crate::Shutdown;

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No session; waiting for a stream
    Waiting,
    /// A session is bound and playing
    Active,
}

/// Receiver statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Datagrams discarded by header validation
    pub invalid_packets: u64,
    pub receive_errors: u64,
    pub decode_errors: u64,
    pub playback_errors: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    /// Distinct stream parameters no session could be opened for
    pub sessions_rejected: u64,
    /// Breaks in the sender's sequence numbering
    pub sequence_gaps: u64,
    pub frames_played: u64,
}

/// Plays whatever stream arrives on one packet source
pub struct ReceiverPipeline<S, F> {
    source: S,
    factory: F,
    session: Option<StreamSession>,
    idle_timeout: Option<Duration>,
    last_activity: Instant,
    last_sequence: Option<u32>,
    /// Parameters the factory last failed on, reported once
    rejected: Option<StreamParams>,
    buf: Vec<u8>,
    shutdown: Shutdown,
    stats: ReceiverStats,
}

impl<S: PacketSource, F: SessionFactory> ReceiverPipeline<S, F> {
    pub fn new(source: S, factory: F, shutdown: Shutdown) -> Self {
        Self {
            source,
            factory,
            session: None,
            idle_timeout: None,
            last_activity: Instant::now(),
            last_sequence: None,
            rejected: None,
            buf: vec![0u8; MAX_PACKET_SIZE],
            shutdown,
            stats: ReceiverStats::default(),
        }
    }

    /// Tear an active session down after this much silence; zero disables
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn state(&self) -> ReceiverState {
        if self.session.is_some() {
            ReceiverState::Active
        } else {
            ReceiverState::Waiting
        }
    }

    /// Parameters of the active session
    pub fn active_params(&self) -> Option<StreamParams> {
        self.session.as_ref().map(|s| *s.params())
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Receive until shutdown
    pub fn run(&mut self) -> ReceiverStats {
        tracing::info!("Waiting for a stream");
        let mut last_stats = Instant::now();

        while !self.shutdown.is_triggered() {
            self.poll_once();

            if last_stats.elapsed() >= Duration::from_secs(STATS_INTERVAL_SECS) {
                last_stats = Instant::now();
                self.log_stats();
            }
        }

        self.teardown("shutdown");
        self.log_stats();
        self.stats
    }

    /// Wait for at most one poll timeout and handle what arrived
    pub fn poll_once(&mut self) {
        match read_packet(&mut self.source, &mut self.buf) {
            Ok(ReadOutcome::Idle) => self.check_idle(),
            Ok(ReadOutcome::Discarded(e)) => {
                self.stats.invalid_packets += 1;
                tracing::debug!("Discarded datagram: {}", e);
            }
            Ok(ReadOutcome::Packet(len)) => {
                let buf = std::mem::take(&mut self.buf);
                self.handle_datagram(&buf[..len]);
                self.buf = buf;
            }
            Err(e) => {
                self.stats.receive_errors += 1;
                tracing::warn!("Receive failed: {}", e);
            }
        }
    }

    fn handle_datagram(&mut self, datagram: &[u8]) {
        let packet = match Packet::parse(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.invalid_packets += 1;
                tracing::debug!("Discarded datagram: {}", e);
                return;
            }
        };

        self.stats.packets_received += 1;
        self.stats.bytes_received += datagram.len() as u64;
        self.last_activity = Instant::now();
        self.track_sequence(packet.header.sequence);

        match packet.header.kind {
            PacketKind::Start => {
                self.bind_session(&packet.header.params);
            }
            PacketKind::Stop => self.teardown("stop packet"),
            PacketKind::Data => {
                if self.bind_session(&packet.header.params) {
                    self.play(&packet);
                }
            }
        }
    }

    fn play(&mut self, packet: &Packet<'_>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.handle_data(packet) {
            Ok(frames) => self.stats.frames_played += frames as u64,
            Err(Error::Codec(e)) => {
                self.stats.decode_errors += 1;
                tracing::warn!("Dropping undecodable chunk: {}", e);
            }
            Err(e) => {
                self.stats.playback_errors += 1;
                tracing::warn!("Playback write failed: {}", e);
            }
        }
    }

    /// Make sure a session for `params` is active; `false` if none could be opened
    fn bind_session(&mut self, params: &StreamParams) -> bool {
        if let Some(session) = &self.session {
            if session.params() == params {
                return true;
            }
            tracing::info!("Stream changed: {} -> {}", session.params(), params);
            self.teardown("parameter change");
        }

        match self.factory.open_session(params) {
            Ok(session) => {
                tracing::info!("Session opened: {}", params);
                self.stats.sessions_opened += 1;
                self.session = Some(session);
                self.rejected = None;
                true
            }
            Err(e) => {
                if self.rejected.as_ref() != Some(params) {
                    tracing::warn!("Failed to open session for {}: {}", params, e);
                    self.stats.sessions_rejected += 1;
                    self.rejected = Some(*params);
                } else {
                    tracing::trace!("Still unable to open session for {}", params);
                }
                false
            }
        }
    }

    fn teardown(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                "Session closed ({}): {}, {} frames played, {} chunks lost",
                reason,
                session.params(),
                session.frames_played(),
                session.dropped_chunks()
            );
            self.stats.sessions_closed += 1;
        }
        self.last_sequence = None;
    }

    fn check_idle(&mut self) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        if self.session.is_some() && self.last_activity.elapsed() >= timeout {
            self.teardown("idle timeout");
        }
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(last) = self.last_sequence {
            if sequence != last.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
                tracing::debug!(
                    "Sequence gap: expected {}, got {}",
                    last.wrapping_add(1),
                    sequence
                );
            }
        }
        self.last_sequence = Some(sequence);
    }

    fn log_stats(&self) {
        let stats = &self.stats;
        tracing::info!(
            "Receiver stats: {} packets, {:.1} KB, {} invalid, {} gaps, {} decode errors, {} frames played",
            stats.packets_received,
            stats.bytes_received as f64 / 1024.0,
            stats.invalid_packets,
            stats.sequence_gaps,
            stats.decode_errors,
            stats.frames_played
        );
    }
}
