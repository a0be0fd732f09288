//! Modular slot index for the streaming ring
//!
//! All slot arithmetic of the buffer ring goes through [`RingIndex`], so the
//! wrap-around cases (oldest queued slot, two-run split of a queue/unqueue
//! request) live in one place.

use std::ops::Range;

/// A slot position in a ring of `len` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingIndex {
    value: usize,
    len: usize,
}

impl RingIndex {
    /// Index `value % len` in a ring of `len` slots
    ///
    /// # Panics
    /// Panics if `len` is zero
    pub fn new(value: usize, len: usize) -> Self {
        assert!(len > 0, "ring length must be non-zero");
        Self { value: value % len, len }
    }

    /// Slot 0 of a ring of `len` slots
    pub fn zero(len: usize) -> Self {
        Self::new(0, len)
    }

    pub fn get(&self) -> usize {
        self.value
    }

    pub fn ring_len(&self) -> usize {
        self.len
    }

    /// Advance `n` slots forward, wrapping
    pub fn wrapping_add(self, n: usize) -> Self {
        Self {
            value: (self.value + n % self.len) % self.len,
            len: self.len,
        }
    }

    /// Step `n` slots backward, wrapping
    ///
    /// With `n` = queued count this is the oldest still-queued slot.
    pub fn back(self, n: usize) -> Self {
        Self {
            value: (self.value + self.len - n % self.len) % self.len,
            len: self.len,
        }
    }

    /// Split `count` slots starting here into at most two contiguous runs
    ///
    /// The first run is `[start, min(start + count, len))`; the second is the
    /// wrapped head `[0, count - first_len)` and is empty when no wrap occurs.
    /// `count` is clamped to the ring length.
    pub fn split(self, count: usize) -> (Range<usize>, Range<usize>) {
        let count = count.min(self.len);
        let tail_len = count.min(self.len - self.value);
        let tail = self.value..self.value + tail_len;
        let head = 0..count - tail_len;
        (tail, head)
    }

    /// Iterate `count` consecutive slots starting here
    pub fn iter(self, count: usize) -> impl Iterator<Item = RingIndex> {
        (0..count.min(self.len)).map(move |i| self.wrapping_add(i))
    }
}
