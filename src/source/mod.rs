use anyhow::Result;

use crate::ring::{Frame, BIN_COUNT};

/// Produces one histogram frame per sampling tick.
///
/// A failing read is surfaced to the caller; the sampling loop logs the
/// error and skips the tick rather than stopping.
pub trait FrameSource: Send {
    /// Returns the source's name for logging.
    fn name(&self) -> &str;

    /// Read one frame from the underlying hardware.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Deterministic frame generator used when no hardware backend is wired up.
///
/// Each frame puts the whole pixel count into a single bin and advances
/// that bin by one per tick, producing a recognizable rotating pattern in
/// query results.
pub struct SyntheticSource {
    pixels: u32,
    tick: usize,
}

impl SyntheticSource {
    /// Create a source reporting `pixels` counts per frame.
    pub fn new(pixels: u32) -> Self {
        Self { pixels, tick: 0 }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut frame = Frame::default();
        frame.bins[self.tick % BIN_COUNT] = self.pixels;
        self.tick += 1;
        Ok(frame)
    }
}
