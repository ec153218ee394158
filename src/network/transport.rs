//! Transport seams between the pipelines and the socket layer

use std::io;

use crate::error::ProtocolError;
use crate::protocol::{PacketHeader, HEADER_SIZE, PACKET_MAGIC};

/// Outbound datagram transport. Sends are fire-and-forget.
pub trait DatagramSink {
    fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize>;
}

/// Inbound packet transport with non-consuming peek.
///
/// Reads block for at most the source's poll timeout and then fail with
/// [`io::ErrorKind::WouldBlock`] or [`io::ErrorKind::TimedOut`].
pub trait PacketSource {
    /// Copy the front of the next datagram without consuming it
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume bytes from the source
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// `true` when each `recv` returns exactly one datagram
    fn preserves_boundaries(&self) -> bool {
        true
    }
}

/// Result of one [`read_packet`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Nothing arrived within the poll timeout
    Idle,
    /// A datagram arrived and was thrown away
    Discarded(ProtocolError),
    /// A validated packet of this many bytes is at the front of the buffer
    Packet(usize),
}

/// Whether an I/O error only signals an expired read timeout
pub fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Read the next packet into `buf`.
///
/// The header is peeked and validated first. A datagram failing validation
/// is consumed whole and reported as [`ReadOutcome::Discarded`]. For
/// byte-stream sources the declared packet length is read in a loop, and a
/// bad header only skips ahead to the next candidate magic.
/// `buf` must hold at least `MAX_PACKET_SIZE` bytes.
pub fn read_packet<S>(source: &mut S, buf: &mut [u8]) -> io::Result<ReadOutcome>
where
    S: PacketSource + ?Sized,
{
    let peeked = match source.peek(buf) {
        Ok(n) => n,
        Err(e) if is_timeout(e.kind()) => return Ok(ReadOutcome::Idle),
        Err(e) => return Err(e),
    };

    let stream = !source.preserves_boundaries();
    if stream && peeked < HEADER_SIZE {
        if peeked == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        return Ok(ReadOutcome::Idle);
    }

    let header = match PacketHeader::decode(&buf[..peeked]) {
        Ok(header) => header,
        Err(e) => {
            if stream {
                let skip = resync_offset(&buf[..peeked]);
                recv_exact(source, &mut buf[..skip])?;
            } else {
                source.recv(buf)?;
            }
            return Ok(ReadOutcome::Discarded(e));
        }
    };
    let len = header.packet_len as usize;

    if stream {
        recv_exact(source, &mut buf[..len])?;
        return Ok(ReadOutcome::Packet(len));
    }

    let received = source.recv(buf)?;
    if received < len {
        return Ok(ReadOutcome::Discarded(ProtocolError::Truncated {
            expected: len,
            actual: received,
        }));
    }
    Ok(ReadOutcome::Packet(len))
}

/// Bytes to skip in a byte stream before the next possible header.
///
/// A magic prefix cut off at the end of `peeked` counts as a candidate.
fn resync_offset(peeked: &[u8]) -> usize {
    let magic = PACKET_MAGIC.to_be_bytes();
    (1..peeked.len())
        .find(|&start| {
            peeked[start..]
                .iter()
                .zip(magic.iter())
                .all(|(byte, expected)| byte == expected)
        })
        .unwrap_or(peeked.len())
}

fn recv_exact<S>(source: &mut S, buf: &mut [u8]) -> io::Result<()>
where
    S: PacketSource + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match source.recv(&mut buf[filled..])? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            n => filled += n,
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transports for pipeline tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Datagram queue shared by a [`MemorySink`] and a [`MemorySource`]
    #[derive(Clone, Default)]
    pub struct MemoryLink {
        queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl MemoryLink {
        pub fn push(&self, datagram: impl Into<Vec<u8>>) {
            self.queue.lock().push_back(datagram.into());
        }

        pub fn len(&self) -> usize {
            self.queue.lock().len()
        }

        pub fn drain(&self) -> Vec<Vec<u8>> {
            self.queue.lock().drain(..).collect()
        }
    }

    impl DatagramSink for MemoryLink {
        fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
            self.push(datagram);
            Ok(datagram.len())
        }
    }

    impl PacketSource for MemoryLink {
        fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let queue = self.queue.lock();
            let front = queue.front().ok_or(io::ErrorKind::WouldBlock)?;
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            Ok(n)
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let front = self
                .queue
                .lock()
                .pop_front()
                .ok_or(io::ErrorKind::WouldBlock)?;
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            Ok(n)
        }
    }

    /// Byte-stream source delivering at most `step` bytes per read
    pub struct TrickleStream {
        pub bytes: VecDeque<u8>,
        pub step: usize,
    }

    impl PacketSource for TrickleStream {
        fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.bytes.len().min(buf.len());
            for (dst, src) in buf.iter_mut().zip(self.bytes.iter()) {
                *dst = *src;
            }
            Ok(n)
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.bytes.len().min(buf.len()).min(self.step);
            for dst in buf.iter_mut().take(n) {
                *dst = self.bytes.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn preserves_boundaries(&self) -> bool {
            false
        }
    }
}
