//! Blocking pull interface over a callback-driven capture backend
//!
//! Audio backends deliver data from their own thread through callbacks. The
//! pipeline wants the opposite: a straight-line loop calling "give me the next
//! chunk". [`CaptureBridge`] joins the two with one mutex and one condition
//! variable. The backend side ([`BridgeNotifier`]) queues fragments and
//! reports state changes, each of which wakes the waiting reader.
//!
//! ```text
//!  backend thread                        pipeline thread
//!  ──────────────                        ───────────────
//!  push_data / push_hole ──┐
//!  set_state             ──┼─▶ Mutex<Shared> + Condvar ◀── read_next_chunk()
//!  latency_update        ──┘                               (waits while empty)
//! ```

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AudioError;

/// Lifecycle of the backend stream as reported by the backend itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Stream is being set up
    Connecting,
    /// Stream is delivering data
    Ready,
    /// Backend reported an error
    Failed,
    /// Stream was shut down
    Terminated,
}

impl BridgeState {
    /// Whether reads may still succeed
    pub fn is_good(self) -> bool {
        matches!(self, BridgeState::Connecting | BridgeState::Ready)
    }
}

/// One backend delivery
#[derive(Debug, Clone)]
enum Fragment {
    Data(Bytes),
    /// Gap in the stream with no data behind it
    Hole(usize),
}

#[derive(Debug)]
struct Shared {
    state: BridgeState,
    fragments: VecDeque<Fragment>,
    queued_bytes: usize,
    cancelled: bool,
    error: Option<String>,
    holes_skipped: u64,
    overruns: u64,
    latency_updates: u64,
}

struct Inner {
    shared: Mutex<Shared>,
    cond: Condvar,
    max_queued_bytes: usize,
}

/// Counters describing the bridge's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub holes_skipped: u64,
    pub overruns: u64,
    pub latency_updates: u64,
    pub queued_bytes: usize,
}

/// Reader side of the bridge
#[derive(Clone)]
pub struct CaptureBridge {
    inner: Arc<Inner>,
}

/// Backend side of the bridge, handed to the capture callbacks
#[derive(Clone)]
pub struct BridgeNotifier {
    inner: Arc<Inner>,
}

impl CaptureBridge {
    /// Create a bridge whose backend queue holds at most `max_queued_bytes`
    pub fn new(max_queued_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: BridgeState::Connecting,
                    fragments: VecDeque::new(),
                    queued_bytes: 0,
                    cancelled: false,
                    error: None,
                    holes_skipped: 0,
                    overruns: 0,
                    latency_updates: 0,
                }),
                cond: Condvar::new(),
                max_queued_bytes,
            }),
        }
    }

    /// Handle for the backend callbacks
    pub fn notifier(&self) -> BridgeNotifier {
        BridgeNotifier {
            inner: self.inner.clone(),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.inner.shared.lock().state
    }

    pub fn stats(&self) -> BridgeStats {
        let shared = self.inner.shared.lock();
        BridgeStats {
            holes_skipped: shared.holes_skipped,
            overruns: shared.overruns,
            latency_updates: shared.latency_updates,
            queued_bytes: shared.queued_bytes,
        }
    }

    /// Block until the next non-empty chunk is available.
    ///
    /// Fails if the backend state is not good, either on entry or after any
    /// wakeup, or once [`cancel`](Self::cancel) was called. Holes are skipped.
    pub fn read_next_chunk(&self) -> Result<Bytes, AudioError> {
        let mut shared = self.inner.shared.lock();
        Self::check(&shared)?;

        loop {
            match shared.fragments.pop_front() {
                None => {
                    self.inner.cond.wait(&mut shared);
                    Self::check(&shared)?;
                }
                Some(Fragment::Hole(len)) => {
                    shared.holes_skipped += 1;
                    tracing::trace!("Skipping {} byte hole in capture stream", len);
                }
                Some(Fragment::Data(bytes)) if bytes.is_empty() => {}
                Some(Fragment::Data(bytes)) => {
                    shared.queued_bytes -= bytes.len();
                    return Ok(bytes);
                }
            }
        }
    }

    /// Block until the backend reports `Ready`, fails, or `timeout` elapses
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<(), AudioError> {
        let deadline = Instant::now() + timeout;
        let mut shared = self.inner.shared.lock();

        loop {
            Self::check(&shared)?;
            if shared.state == BridgeState::Ready {
                return Ok(());
            }
            if self.inner.cond.wait_until(&mut shared, deadline).timed_out() {
                Self::check(&shared)?;
                return if shared.state == BridgeState::Ready {
                    Ok(())
                } else {
                    Err(AudioError::Timeout)
                };
            }
        }
    }

    /// Fail the pending and all future reads with [`AudioError::Cancelled`]
    pub fn cancel(&self) {
        self.inner.shared.lock().cancelled = true;
        self.inner.cond.notify_all();
    }

    fn check(shared: &Shared) -> Result<(), AudioError> {
        if shared.cancelled {
            return Err(AudioError::Cancelled);
        }
        if !shared.state.is_good() {
            let reason = shared
                .error
                .clone()
                .unwrap_or_else(|| format!("capture stream is {:?}", shared.state));
            return Err(AudioError::CaptureFailed(reason));
        }
        Ok(())
    }
}

impl BridgeNotifier {
    /// Queue captured bytes and wake the reader.
    ///
    /// A delivery larger than the whole queue is dropped and counted as an
    /// overrun.
    pub fn push_data(&self, bytes: Bytes) {
        let mut shared = self.inner.shared.lock();

        if bytes.len() > self.inner.max_queued_bytes {
            shared.overruns += 1;
            tracing::debug!(
                "Dropping {} byte capture delivery, queue holds {}",
                bytes.len(),
                self.inner.max_queued_bytes
            );
            return;
        }

        // Backend buffer is bounded: drop the oldest deliveries
        while shared.queued_bytes + bytes.len() > self.inner.max_queued_bytes {
            match shared.fragments.pop_front() {
                Some(Fragment::Data(old)) => {
                    shared.queued_bytes -= old.len();
                    shared.overruns += 1;
                }
                Some(Fragment::Hole(_)) => {}
                None => break,
            }
        }

        shared.queued_bytes += bytes.len();
        shared.fragments.push_back(Fragment::Data(bytes));
        drop(shared);
        self.inner.cond.notify_all();
    }

    /// Report a gap of `len` bytes the backend has no data for
    pub fn push_hole(&self, len: usize) {
        self.inner.shared.lock().fragments.push_back(Fragment::Hole(len));
        self.inner.cond.notify_all();
    }

    pub fn set_state(&self, state: BridgeState) {
        self.inner.shared.lock().state = state;
        self.inner.cond.notify_all();
    }

    /// Mark the stream failed with a reason surfaced to the reader
    pub fn fail(&self, reason: impl Into<String>) {
        let mut shared = self.inner.shared.lock();
        shared.state = BridgeState::Failed;
        shared.error = Some(reason.into());
        drop(shared);
        self.inner.cond.notify_all();
    }

    pub fn latency_update(&self) {
        self.inner.shared.lock().latency_updates += 1;
        self.inner.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_blocks_until_data_ready() {
        let bridge = CaptureBridge::new(1 << 16);
        let notifier = bridge.notifier();
        notifier.set_state(BridgeState::Ready);

        let start = Instant::now();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            notifier.latency_update();
            thread::sleep(Duration::from_millis(10));
            notifier.push_data(Bytes::from_static(&[1, 2, 3]));
        });

        let chunk = bridge.read_next_chunk().unwrap();
        assert_eq!(&chunk[..], &[1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_millis(50));
        producer.join().unwrap();

        assert_eq!(bridge.stats().latency_updates, 1);
        assert_eq!(bridge.stats().queued_bytes, 0);
    }

    #[test]
    fn test_skips_holes_and_empty_chunks() {
        let bridge = CaptureBridge::new(1 << 16);
        let notifier = bridge.notifier();
        notifier.set_state(BridgeState::Ready);

        notifier.push_hole(128);
        notifier.push_data(Bytes::new());
        notifier.push_hole(64);
        notifier.push_data(Bytes::from_static(&[9, 9]));

        let chunk = bridge.read_next_chunk().unwrap();
        assert_eq!(&chunk[..], &[9, 9]);
        assert_eq!(bridge.stats().holes_skipped, 2);
    }

    #[test]
    fn test_failure_wakes_reader() {
        let bridge = CaptureBridge::new(1 << 16);
        let notifier = bridge.notifier();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.fail("device unplugged");
        });

        let err = bridge.read_next_chunk().unwrap_err();
        assert!(matches!(err, AudioError::CaptureFailed(ref msg) if msg == "device unplugged"));
        producer.join().unwrap();
    }

    #[test]
    fn test_bad_state_fails_before_draining() {
        let bridge = CaptureBridge::new(1 << 16);
        let notifier = bridge.notifier();
        notifier.push_data(Bytes::from_static(&[1]));
        notifier.set_state(BridgeState::Terminated);

        assert!(matches!(
            bridge.read_next_chunk(),
            Err(AudioError::CaptureFailed(_))
        ));
    }

    #[test]
    fn test_cancel_wakes_reader() {
        let bridge = CaptureBridge::new(1 << 16);
        bridge.notifier().set_state(BridgeState::Ready);

        let canceller = bridge.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert!(matches!(bridge.read_next_chunk(), Err(AudioError::Cancelled)));
        handle.join().unwrap();
    }

    #[test]
    fn test_overrun_drops_oldest() {
        let bridge = CaptureBridge::new(4);
        let notifier = bridge.notifier();
        notifier.set_state(BridgeState::Ready);

        notifier.push_data(Bytes::from_static(&[1, 1]));
        notifier.push_data(Bytes::from_static(&[2, 2]));
        notifier.push_data(Bytes::from_static(&[3, 3]));

        assert_eq!(bridge.stats().overruns, 1);
        assert_eq!(&bridge.read_next_chunk().unwrap()[..], &[2, 2]);
        assert_eq!(&bridge.read_next_chunk().unwrap()[..], &[3, 3]);
    }

    #[test]
    fn test_oversized_delivery_is_dropped() {
        let bridge = CaptureBridge::new(4);
        let notifier = bridge.notifier();
        notifier.set_state(BridgeState::Ready);

        notifier.push_data(Bytes::from_static(&[1, 1]));
        notifier.push_data(Bytes::from_static(&[9; 5]));

        let stats = bridge.stats();
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.queued_bytes, 2);
        assert_eq!(&bridge.read_next_chunk().unwrap()[..], &[1, 1]);
    }

    #[test]
    fn test_wait_until_ready() {
        let bridge = CaptureBridge::new(16);
        assert!(matches!(
            bridge.wait_until_ready(Duration::from_millis(10)),
            Err(AudioError::Timeout)
        ));

        let notifier = bridge.notifier();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.set_state(BridgeState::Ready);
        });
        bridge.wait_until_ready(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }
}
