//! Packet header encoding and decoding.
//!
//! ```text
//! ┌─────────┬──────┬───────┬────────┬──────────┬───────┬────────┬──────┬──────┬──────────┐
//! │ Magic   │ Kind │ Flags │ Length │ Sequence │ Codec │ Format │ Chan │ Rsvd │ Rate     │
//! │ 4 bytes │ 1    │ 1     │ 2      │ 4        │ 1     │ 1      │ 1    │ 1    │ 4        │
//! └─────────┴──────┴───────┴────────┴──────────┴───────┴────────┴──────┴──────┴──────────┘
//! ```
//!
//! All multi-byte integers are big endian. `Length` covers header and payload.

use bytes::{Buf, BufMut};

use crate::audio::SampleFormat;
use crate::codec::CodecKind;
use crate::constants::MAX_PACKET_SIZE;
use crate::error::ProtocolError;
use crate::protocol::StreamParams;

/// First four bytes of every packet
pub const PACKET_MAGIC: u32 = 0xAA70_4253;

/// Header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Largest payload fragment one packet carries
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Flag bits
pub mod flags {
    /// More fragments of the same chunk follow
    pub const MORE_FRAGMENTS: u8 = 0b0000_0001;
    /// This fragment continues a chunk started by an earlier packet
    pub const CONTINUATION: u8 = 0b0000_0010;
}

/// Packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Announces a stream with the header's parameters
    Start,
    /// Ends the stream
    Stop,
    /// Carries a codec chunk fragment
    Data,
}

impl PacketKind {
    pub fn id(self) -> u8 {
        match self {
            PacketKind::Start => 0,
            PacketKind::Stop => 1,
            PacketKind::Data => 2,
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(PacketKind::Start),
            1 => Ok(PacketKind::Stop),
            2 => Ok(PacketKind::Data),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    pub flags: u8,
    /// Header plus payload length in bytes
    pub packet_len: u16,
    pub sequence: u32,
    pub params: StreamParams,
}

impl PacketHeader {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn payload_len(&self) -> usize {
        self.packet_len as usize - HEADER_SIZE
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(PACKET_MAGIC);
        buf.put_u8(self.kind.id());
        buf.put_u8(self.flags);
        buf.put_u16(self.packet_len);
        buf.put_u32(self.sequence);
        buf.put_u8(self.params.codec.id());
        buf.put_u8(self.params.format.id());
        buf.put_u8(self.params.channels);
        buf.put_u8(0);
        buf.put_u32(self.params.sample_rate);
    }

    /// Decode and validate a header from the first [`HEADER_SIZE`] bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let magic = buf.get_u32();
        if magic != PACKET_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let kind = PacketKind::try_from(buf.get_u8())?;
        let flags = buf.get_u8();
        let packet_len = buf.get_u16();
        let sequence = buf.get_u32();
        let codec = CodecKind::try_from(buf.get_u8())?;
        let format = SampleFormat::try_from(buf.get_u8())?;
        let channels = buf.get_u8();
        let _reserved = buf.get_u8();
        let sample_rate = buf.get_u32();

        if (packet_len as usize) < HEADER_SIZE || packet_len as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::InvalidLength(packet_len as usize));
        }

        let params = StreamParams::new(codec, format, channels, sample_rate);
        params.validate()?;

        Ok(Self {
            kind,
            flags,
            packet_len,
            sequence,
            params,
        })
    }
}

/// A validated packet borrowing its payload from the receive buffer
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse a complete datagram
    pub fn parse(datagram: &'a [u8]) -> Result<Self, ProtocolError> {
        let header = PacketHeader::decode(datagram)?;
        let len = header.packet_len as usize;
        if datagram.len() < len {
            return Err(ProtocolError::Truncated {
                expected: len,
                actual: datagram.len(),
            });
        }

        Ok(Self {
            header,
            payload: &datagram[HEADER_SIZE..len],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn header(kind: PacketKind) -> PacketHeader {
        PacketHeader {
            kind,
            flags: flags::MORE_FRAGMENTS,
            packet_len: HEADER_SIZE as u16 + 3,
            sequence: 0xDEAD_BEEF,
            params: StreamParams::new(CodecKind::HighFidelity, SampleFormat::F32Le, 2, 48000),
        }
    }

    #[test]
    fn test_layout_is_network_order() {
        let mut buf = BytesMut::new();
        header(PacketKind::Data).encode(&mut buf);
        buf.extend_from_slice(&[7, 8, 9]);

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[..4], &[0xAA, 0x70, 0x42, 0x53]);
        assert_eq!(buf[4], 2);
        assert_eq!(buf[5], flags::MORE_FRAGMENTS);
        assert_eq!(&buf[6..8], &[0, 23]);
        assert_eq!(&buf[8..12], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&buf[12..16], &[1, 2, 2, 0]);
        assert_eq!(&buf[16..20], &48000u32.to_be_bytes());

        let packet = Packet::parse(&buf).unwrap();
        assert_eq!(packet.header, header(PacketKind::Data));
        assert_eq!(packet.payload, &[7, 8, 9]);
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = BytesMut::new();
        header(PacketKind::Start).encode(&mut buf);
        buf[0] = 0x00;

        assert_eq!(
            PacketHeader::decode(&buf),
            Err(ProtocolError::BadMagic(0x0070_4253))
        );
    }

    #[test]
    fn test_truncated_and_invalid() {
        assert_eq!(
            PacketHeader::decode(&[0xAA, 0x70]),
            Err(ProtocolError::Truncated {
                expected: HEADER_SIZE,
                actual: 2
            })
        );

        // Declares three payload bytes that are missing
        let mut buf = BytesMut::new();
        header(PacketKind::Data).encode(&mut buf);
        assert!(matches!(
            Packet::parse(&buf),
            Err(ProtocolError::Truncated { .. })
        ));

        let mut buf = BytesMut::new();
        header(PacketKind::Data).encode(&mut buf);
        buf[4] = 9;
        assert_eq!(
            PacketHeader::decode(&buf),
            Err(ProtocolError::UnknownKind(9))
        );

        let mut buf = BytesMut::new();
        header(PacketKind::Data).encode(&mut buf);
        buf[14] = 0;
        assert!(matches!(
            PacketHeader::decode(&buf),
            Err(ProtocolError::InvalidDescriptor(_))
        ));
    }
}
