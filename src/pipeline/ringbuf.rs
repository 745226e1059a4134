//! Overwrite-oldest ring buffer holding the recording pre-roll

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer as _};
use ringbuf::HeapRb;

use crate::Frame;

/// Default pre-roll: about one second at 30 fps.
pub const DEFAULT_PREROLL_FRAMES: usize = 30;

/// Fixed-capacity frame buffer. Pushing into a full buffer evicts the oldest frame.
pub struct RingBuffer {
    ring: HeapRb<Frame>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_drained: AtomicUsize,
    frames_dropped: AtomicUsize,
}

impl RingBuffer {
    /// Capacity is clamped to at least one frame.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Append a frame, evicting the oldest one when full.
    pub fn push(&mut self, frame: Frame) {
        if self.ring.push_overwrite(frame).is_some() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove every buffered frame, oldest first.
    pub fn drain(&mut self) -> Vec<Frame> {
        let frames: Vec<Frame> = self.ring.pop_iter().collect();
        self.stats
            .frames_drained
            .fetch_add(frames.len(), Ordering::Relaxed);
        frames
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// (written, drained, dropped)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.frames_written.load(Ordering::Relaxed),
            self.stats.frames_drained.load(Ordering::Relaxed),
            self.stats.frames_dropped.load(Ordering::Relaxed),
        )
    }
}
