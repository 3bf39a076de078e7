use std::collections::VecDeque;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::clock::{Timekeeper, Timestamp};

/// Number of bins in one hardware histogram frame.
pub const BIN_COUNT: usize = 256;

/// One hardware histogram capture: a fixed array of per-bin counters.
///
/// Bin semantics are opaque to the aggregator; each slot is treated as a
/// plain counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Per-bin counts reported by the hardware for one frame.
    pub bins: [u32; BIN_COUNT],
}

impl Frame {
    /// Frame with every bin set to `value`.
    pub fn filled(value: u32) -> Self {
        Self {
            bins: [value; BIN_COUNT],
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::filled(0)
    }
}

/// Aggregation over zero or more captured frames: how many frames were
/// summed and their elementwise bin totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Number of frames included in the aggregation.
    pub frames: u64,
    /// Elementwise sum of the included frames' bins.
    pub bins: [u64; BIN_COUNT],
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            frames: 0,
            bins: [0; BIN_COUNT],
        }
    }
}

struct Entry {
    frame: Frame,
    timestamp: Timestamp,
}

struct Window {
    /// Entries newest-first; timestamps are non-increasing front to back
    /// as long as the timekeeper is monotonic.
    entries: VecDeque<Entry>,
    capacity: usize,
    cumulative_frames: u64,
    cumulative_bins: [u64; BIN_COUNT],
}

/// Bounded, newest-first buffer of captured frames plus all-time totals.
///
/// A single mutex guards the window and the cumulative totals, so every
/// operation observes one consistent snapshot and concurrent inserts and
/// queries serialize cleanly. Critical sections are bounded by O(capacity)
/// work and never block on I/O.
pub struct Ringbuffer {
    window: Mutex<Window>,
    timekeeper: Box<dyn Timekeeper>,
}

impl std::fmt::Debug for Ringbuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let w = self.window.lock();
        f.debug_struct("Ringbuffer")
            .field("occupancy", &w.entries.len())
            .field("capacity", &w.capacity)
            .field("cumulative_frames", &w.cumulative_frames)
            .finish()
    }
}

impl Ringbuffer {
    /// Create a ringbuffer holding at most `capacity` frames.
    pub fn new(capacity: usize, timekeeper: Box<dyn Timekeeper>) -> Result<Self> {
        if capacity == 0 {
            bail!("ringbuffer capacity must be > 0");
        }

        Ok(Self {
            window: Mutex::new(Window {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                cumulative_frames: 0,
                cumulative_bins: [0; BIN_COUNT],
            }),
            timekeeper,
        })
    }

    /// Record `frame` at the current time, evicting the oldest entry when
    /// the window is full. Cumulative totals always grow; eviction never
    /// subtracts from them.
    pub fn insert(&self, frame: &Frame) {
        let mut w = self.window.lock();

        if w.entries.len() == w.capacity {
            w.entries.pop_back();
        }
        w.entries.push_front(Entry {
            frame: *frame,
            timestamp: self.timekeeper.current_time(),
        });

        w.cumulative_frames += 1;
        for (total, bin) in w.cumulative_bins.iter_mut().zip(frame.bins.iter()) {
            *total += u64::from(*bin);
        }
    }

    /// Change the window capacity, dropping oldest entries when it shrinks
    /// below the current occupancy. Returns false, leaving all state
    /// untouched, for a zero capacity.
    pub fn resize(&self, capacity: usize) -> bool {
        let mut w = self.window.lock();

        if capacity == 0 {
            return false;
        }

        w.capacity = capacity;
        if w.entries.len() > capacity {
            // truncate keeps the front of the deque, i.e. the newest entries.
            w.entries.truncate(capacity);
        }

        true
    }

    /// All-time totals, independent of current window contents.
    pub fn collect_cumulative(&self) -> Sample {
        let w = self.window.lock();
        Sample {
            frames: w.cumulative_frames,
            bins: w.cumulative_bins,
        }
    }

    /// Aggregate every entry currently in the window.
    pub fn collect_ringbuffer_all(&self) -> Sample {
        let w = self.window.lock();
        sum_newest(&w, w.entries.len())
    }

    /// Aggregate the `max_frames` most recent entries, clamped to the
    /// window occupancy.
    pub fn collect_max(&self, max_frames: u32) -> Sample {
        let w = self.window.lock();
        sum_newest(&w, max_frames as usize)
    }

    /// Aggregate every entry captured at or after `timestamp`.
    pub fn collect_after(&self, timestamp: Timestamp) -> Sample {
        let w = self.window.lock();
        let qualified = cutoff(&w, timestamp);
        sum_newest(&w, qualified)
    }

    /// Aggregate at most `max_frames` of the entries captured at or after
    /// `timestamp`.
    pub fn collect_max_after(&self, timestamp: Timestamp, max_frames: u32) -> Sample {
        let w = self.window.lock();
        let qualified = cutoff(&w, timestamp);
        sum_newest(&w, qualified.min(max_frames as usize))
    }
}

/// Number of entries captured at or after `timestamp`. Entries are kept
/// newest-first with non-increasing timestamps, so the qualifying entries
/// form a prefix and one binary search finds its end.
fn cutoff(w: &Window, timestamp: Timestamp) -> usize {
    w.entries.partition_point(|e| e.timestamp >= timestamp)
}

/// Sum the `n` newest entries (clamped to occupancy) into a Sample.
fn sum_newest(w: &Window, n: usize) -> Sample {
    let n = n.min(w.entries.len());

    let mut bins = [0u64; BIN_COUNT];
    for entry in w.entries.iter().take(n) {
        for (total, bin) in bins.iter_mut().zip(entry.frame.bins.iter()) {
            *total += u64::from(*bin);
        }
    }

    Sample {
        frames: n as u64,
        bins,
    }
}
