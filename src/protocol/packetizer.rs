//! Splitting codec chunks into packets and joining them back
//!
//! Every packet, control or data, takes the next sequence id. A chunk larger
//! than one payload becomes several packets: all but the last carry
//! [`flags::MORE_FRAGMENTS`], all but the first carry [`flags::CONTINUATION`].
//! The receiving [`Depacketizer`] only yields a chunk when every fragment
//! arrived with consecutive sequence ids.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::header::{flags, Packet, PacketHeader, PacketKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::protocol::StreamParams;

/// Sender-side packet builder for one stream
pub struct Packetizer {
    params: StreamParams,
    sequence: u32,
    max_payload: usize,
}

impl Packetizer {
    pub fn new(params: StreamParams) -> Self {
        Self::with_max_payload(params, MAX_PAYLOAD_SIZE)
    }

    /// Use a payload bound smaller than [`MAX_PAYLOAD_SIZE`]
    pub fn with_max_payload(params: StreamParams, max_payload: usize) -> Self {
        Self {
            params,
            sequence: 0,
            max_payload: max_payload.clamp(1, MAX_PAYLOAD_SIZE),
        }
    }

    /// Start at a given sequence id
    pub fn starting_at(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sequence id the next packet will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    pub fn start_packet(&mut self) -> Bytes {
        self.build(PacketKind::Start, 0, &[])
    }

    pub fn stop_packet(&mut self) -> Bytes {
        self.build(PacketKind::Stop, 0, &[])
    }

    /// Split `chunk` into data packets in order. An empty chunk yields none.
    pub fn packetize(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let count = chunk.len().div_ceil(self.max_payload);
        let mut packets = Vec::with_capacity(count);

        for (index, fragment) in chunk.chunks(self.max_payload).enumerate() {
            let mut packet_flags = 0;
            if index + 1 < count {
                packet_flags |= flags::MORE_FRAGMENTS;
            }
            if index > 0 {
                packet_flags |= flags::CONTINUATION;
            }
            packets.push(self.build(PacketKind::Data, packet_flags, fragment));
        }

        packets
    }

    fn build(&mut self, kind: PacketKind, packet_flags: u8, payload: &[u8]) -> Bytes {
        let header = PacketHeader {
            kind,
            flags: packet_flags,
            packet_len: (HEADER_SIZE + payload.len()) as u16,
            sequence: self.sequence,
            params: self.params,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        header.encode(&mut buf);
        buf.put_slice(payload);
        buf.freeze()
    }
}

/// Receiver-side reassembly of fragmented chunks
#[derive(Default)]
pub struct Depacketizer {
    partial: BytesMut,
    /// Sequence id the next continuation fragment must carry
    expected: Option<u32>,
    /// Sequence id the next fragment of an already counted headless chunk carries
    orphan: Option<u32>,
    dropped_chunks: u64,
}

impl Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one data packet; returns a chunk once its last fragment arrived.
    ///
    /// Incomplete chunks are discarded when a gap in the sequence shows up.
    pub fn push(&mut self, packet: &Packet<'_>) -> Option<Bytes> {
        let header = &packet.header;
        if header.kind != PacketKind::Data {
            return None;
        }

        if header.has_flag(flags::CONTINUATION) {
            if self.expected != Some(header.sequence) {
                // Nothing to continue; count the headless chunk on its first fragment
                let pending = !self.partial.is_empty() || self.expected.is_some();
                if !pending && self.orphan != Some(header.sequence) {
                    self.dropped_chunks += 1;
                }
                self.discard();
                self.orphan = header
                    .has_flag(flags::MORE_FRAGMENTS)
                    .then(|| header.sequence.wrapping_add(1));
                return None;
            }
        } else if !self.partial.is_empty() || self.expected.is_some() {
            // A new chunk started before the previous one completed
            self.discard();
        }

        self.orphan = None;
        self.partial.extend_from_slice(packet.payload);

        if header.has_flag(flags::MORE_FRAGMENTS) {
            self.expected = Some(header.sequence.wrapping_add(1));
            return None;
        }

        self.expected = None;
        let chunk = self.partial.split().freeze();
        (!chunk.is_empty()).then_some(chunk)
    }

    /// Forget any partial chunk
    pub fn reset(&mut self) {
        self.partial.clear();
        self.expected = None;
        self.orphan = None;
    }

    /// Chunks lost to missing fragments
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks
    }

    fn discard(&mut self) {
        if !self.partial.is_empty() || self.expected.is_some() {
            self.dropped_chunks += 1;
        }
        self.reset();
    }
}
