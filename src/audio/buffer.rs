//! PCM frames and the byte ring that regroups capture chunks into codec frames
//!
//! Capture backends deliver audio in whatever granularity they like, while
//! codecs accept exactly one frame of a fixed size. [`FrameRing`] sits in
//! between: chunks go in at `head`, codec-sized frames come out at `tail`.

use bytes::Bytes;
use std::time::Duration;

use crate::audio::format::SampleFormat;
use crate::error::AudioError;

/// Interleaved PCM audio, immutable once produced
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    data: Bytes,
    format: SampleFormat,
    channels: u8,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: Bytes, format: SampleFormat, channels: u8, sample_rate: u32) -> Self {
        Self {
            data,
            format,
            channels,
            sample_rate,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sampling instants across all channels
    pub fn frame_count(&self) -> usize {
        let frame_bytes = self.format.bytes_per_sample() * self.channels as usize;
        if frame_bytes == 0 {
            0
        } else {
            self.data.len() / frame_bytes
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.frame_count() as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

/// Fixed-capacity circular byte buffer.
///
/// Unread bytes are `(head - tail) mod storage`, where storage is one byte
/// larger than the usable capacity so a full ring is distinguishable from an
/// empty one. Writes are all-or-nothing: a chunk that does not fit is
/// rejected and the buffered audio is left untouched.
pub struct FrameRing {
    storage: Box<[u8]>,
    head: usize,
    tail: usize,
    /// Holds a frame that straddles the end of `storage`
    scratch: Vec<u8>,
}

impl FrameRing {
    /// Create a ring able to hold `capacity` unread bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
            scratch: Vec::new(),
        }
    }

    /// Create a ring holding `seconds` of audio in the given layout
    pub fn for_audio(seconds: u32, sample_rate: u32, channels: u8, format: SampleFormat) -> Self {
        let bytes_per_second =
            sample_rate as usize * channels as usize * format.bytes_per_sample();
        Self::with_capacity(bytes_per_second * seconds.max(1) as usize)
    }

    /// Usable capacity in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len() - 1
    }

    /// Unread byte count
    pub fn available(&self) -> usize {
        let size = self.storage.len();
        (self.head + size - self.tail) % size
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Append `bytes` at `head`, wrapping across the end of the storage
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), AudioError> {
        let free = self.free();
        if bytes.len() > free {
            return Err(AudioError::BufferOverflow {
                requested: bytes.len(),
                free,
            });
        }

        let size = self.storage.len();
        let first = bytes.len().min(size - self.head);
        self.storage[self.head..self.head + first].copy_from_slice(&bytes[..first]);

        let rest = &bytes[first..];
        self.storage[..rest.len()].copy_from_slice(rest);

        self.head = (self.head + bytes.len()) % size;
        Ok(())
    }

    /// Take the next `frame_bytes` bytes, or `None` if fewer are buffered.
    ///
    /// The returned view is valid until the next call on the ring.
    pub fn read_frame(&mut self, frame_bytes: usize) -> Option<&[u8]> {
        if frame_bytes == 0 || self.available() < frame_bytes {
            return None;
        }

        let size = self.storage.len();
        let start = self.tail;
        self.tail = (self.tail + frame_bytes) % size;

        if start + frame_bytes <= size {
            return Some(&self.storage[start..start + frame_bytes]);
        }

        let first = size - start;
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.storage[start..]);
        self.scratch
            .extend_from_slice(&self.storage[..frame_bytes - first]);
        Some(&self.scratch)
    }

    /// Drop all unread bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_basic() {
        let mut ring = FrameRing::with_capacity(8);
        assert_eq!(ring.capacity(), 8);
        assert!(ring.is_empty());

        ring.write(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ring.available(), 5);
        assert!(ring.read_frame(6).is_none());
        assert_eq!(ring.read_frame(4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(ring.available(), 1);
    }

    #[test]
    fn test_frame_straddles_wrap() {
        let mut ring = FrameRing::with_capacity(8);
        ring.write(&[0; 6]).unwrap();
        assert!(ring.read_frame(6).is_some());

        // head sits at 6 of 9 storage bytes, so this write wraps
        ring.write(&[10, 11, 12, 13, 14, 15]).unwrap();
        assert_eq!(ring.read_frame(4).unwrap(), &[10, 11, 12, 13]);
        assert_eq!(ring.read_frame(2).unwrap(), &[14, 15]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overrun_rejects_whole_chunk() {
        let mut ring = FrameRing::with_capacity(4);
        ring.write(&[1, 2, 3]).unwrap();

        let err = ring.write(&[4, 5]).unwrap_err();
        assert!(matches!(
            err,
            AudioError::BufferOverflow {
                requested: 2,
                free: 1
            }
        ));
        assert_eq!(ring.available(), 3);

        ring.write(&[4]).unwrap();
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.read_frame(4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_sized_for_audio() {
        let ring = FrameRing::for_audio(2, 48000, 2, SampleFormat::S16Le);
        assert_eq!(ring.capacity(), 2 * 48000 * 2 * 2);
    }

    #[test]
    fn test_audio_frame_counts() {
        let frame = AudioFrame::new(Bytes::from(vec![0u8; 480 * 4]), SampleFormat::S16Le, 2, 48000);
        assert_eq!(frame.frame_count(), 480);
        assert_eq!(frame.duration(), Duration::from_millis(10));
    }

    proptest! {
        #[test]
        fn prop_reads_preserve_write_order(
            capacity in 16usize..256,
            chunks in proptest::collection::vec(1usize..64, 1..40),
            frame in 1usize..48,
            offset in 0usize..64,
        ) {
            let mut ring = FrameRing::with_capacity(capacity);

            // Move the cursors so frames cross the wrap boundary
            let offset = offset % capacity;
            ring.write(&vec![0xEE; offset]).unwrap();
            prop_assert!(ring.read_frame(offset).is_some() || offset == 0);

            let mut written = Vec::new();
            let mut read = Vec::new();
            let mut next = 0u8;

            for len in chunks {
                let chunk: Vec<u8> = (0..len).map(|_| { next = next.wrapping_add(1); next }).collect();
                if ring.write(&chunk).is_ok() {
                    written.extend_from_slice(&chunk);
                }
                while let Some(bytes) = ring.read_frame(frame) {
                    read.extend_from_slice(bytes);
                }
            }

            prop_assert_eq!(&written[..read.len()], &read[..]);
            prop_assert_eq!(written.len() - read.len(), ring.available());
        }
    }
}
