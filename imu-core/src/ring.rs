//! Acquisition ring: single-producer (tick ISR) / single-consumer
//! (foreground) queue of raw frames.
//!
//! The ring slots themselves need no synchronization; the release fence on
//! `pending` publishes a just-written frame to the consumer, and the
//! acquire load on the consumer's side makes that frame's writes visible
//! before it reads them. Write and read cursors are each touched by
//! exactly one side, so they stay plain `usize` fields rather than atomics.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::config::RING_CAPACITY;
use crate::frame::RawFrame;

/// Fixed-capacity single-producer/single-consumer ring of [`RawFrame`]s.
pub struct AcquisitionRing {
    slots: [RawFrame; RING_CAPACITY],
    write_cursor: usize,
    read_cursor: usize,
    pending: AtomicUsize,
    /// Saturating count of frames dropped because the ring was full.
    /// Additive instrumentation; does not change `pending`'s invariant.
    overrun_count: AtomicU32,
}

impl AcquisitionRing {
    pub const fn new() -> Self {
        AcquisitionRing {
            slots: [RawFrame::zeroed(); RING_CAPACITY],
            write_cursor: 0,
            read_cursor: 0,
            pending: AtomicUsize::new(0),
            overrun_count: AtomicU32::new(0),
        }
    }

    /// Producer-side: store `frame` at the write cursor and publish it.
    /// Called only from the tick timer ISR. If the ring is full, the
    /// frame is dropped and [`AcquisitionRing::overrun_count`] increments;
    /// the write cursor and pending count are left untouched so the
    /// invariant `0 <= pending <= RING_CAPACITY` always holds.
    pub fn produce(&mut self, frame: RawFrame) {
        let pending = self.pending.load(Ordering::Relaxed);
        if pending >= RING_CAPACITY {
            self.overrun_count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.slots[self.write_cursor] = frame;
        self.write_cursor = (self.write_cursor + 1) % RING_CAPACITY;
        // Release: publishes the frame write above to the consumer's
        // acquire load in `pending()`.
        self.pending.fetch_add(1, Ordering::Release);
    }

    /// Number of frames available to the consumer. Foreground-only.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Consumer-side: returns the oldest unconsumed frame without
    /// advancing the read cursor, or `None` if the ring is empty.
    pub fn peek(&self) -> Option<&RawFrame> {
        if self.pending() == 0 {
            None
        } else {
            Some(&self.slots[self.read_cursor])
        }
    }

    /// Consumer-side: advances the read cursor past the frame most
    /// recently returned by [`AcquisitionRing::peek`] and decrements the
    /// pending count. Panics (debug builds) if called with nothing
    /// pending; callers are expected to check `pending() > 0` first.
    pub fn consume(&mut self) {
        debug_assert!(self.pending() > 0, "consume() called on an empty ring");
        self.read_cursor = (self.read_cursor + 1) % RING_CAPACITY;
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Total number of frames dropped for overrun since boot.
    pub fn overrun_count(&self) -> u32 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// `(write_cursor - read_cursor) mod RING_CAPACITY`, exposed so callers
    /// can cross-check it against `pending()`.
    pub fn cursor_delta(&self) -> usize {
        (self.write_cursor + RING_CAPACITY - self.read_cursor) % RING_CAPACITY
    }
}

impl Default for AcquisitionRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_ts(ts: u32) -> RawFrame {
        let mut f = RawFrame::zeroed();
        f.time_stamp = ts;
        f
    }

    #[test]
    fn produce_consume_fifo_order() {
        let mut ring = AcquisitionRing::new();
        for i in 0..5 {
            ring.produce(frame_with_ts(i));
        }
        assert_eq!(ring.pending(), 5);
        for i in 0..5 {
            assert_eq!(ring.peek().unwrap().time_stamp, i);
            ring.consume();
        }
        assert_eq!(ring.pending(), 0);
    }

    #[test]
    fn cursor_delta_matches_pending_invariant() {
        let mut ring = AcquisitionRing::new();
        for i in 0..37 {
            ring.produce(frame_with_ts(i));
        }
        for _ in 0..11 {
            ring.consume();
        }
        assert_eq!(ring.cursor_delta(), ring.pending());
    }

    #[test]
    fn overrun_does_not_advance_write_cursor_or_exceed_capacity() {
        let mut ring = AcquisitionRing::new();
        for i in 0..(RING_CAPACITY as u32 + 5) {
            ring.produce(frame_with_ts(i));
        }
        assert_eq!(ring.pending(), RING_CAPACITY);
        assert_eq!(ring.overrun_count(), 5);
        assert_eq!(ring.cursor_delta(), ring.pending());
    }

    #[test]
    fn wraparound_preserves_fifo_order() {
        let mut ring = AcquisitionRing::new();
        // Fill, drain, and refill past the wrap point.
        for i in 0..RING_CAPACITY as u32 {
            ring.produce(frame_with_ts(i));
        }
        for _ in 0..RING_CAPACITY {
            ring.consume();
        }
        for i in 1000..1010 {
            ring.produce(frame_with_ts(i));
        }
        for i in 1000..1010 {
            assert_eq!(ring.peek().unwrap().time_stamp, i);
            ring.consume();
        }
    }
}
