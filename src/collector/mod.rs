use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ring::Ringbuffer;
use crate::source::FrameSource;

/// Periodically samples the hardware frame source into the ringbuffer.
///
/// Owns one background task. `start` and `stop` are idempotent; `stop`
/// wakes the task immediately rather than waiting for its next tick, and
/// returns only once the task has finished. A failing frame read is logged
/// and the tick skipped; the loop keeps running.
pub struct HistogramCollector {
    ring: Arc<Ringbuffer>,
    source: Arc<tokio::sync::Mutex<Box<dyn FrameSource>>>,
    interval: Duration,
    task: tokio::sync::Mutex<Option<RunningTask>>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HistogramCollector {
    /// Create a collector sampling `source` into `ring` every `interval`.
    pub fn new(ring: Arc<Ringbuffer>, source: Box<dyn FrameSource>, interval: Duration) -> Self {
        Self {
            ring,
            source: Arc::new(tokio::sync::Mutex::new(source)),
            interval,
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the background sampling task. No-op if already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("collector already running");
            return;
        }

        let cancel = CancellationToken::new();
        let ring = Arc::clone(&self.ring);
        let source = Arc::clone(&self.source);
        let interval = self.interval;

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            sampling_loop(ring, source, interval, loop_cancel).await;
        });

        *task = Some(RunningTask { cancel, handle });

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "collector started",
        );
    }

    /// Signal the sampling task to wake and wait for it to finish. No-op if
    /// not running.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some(running) = task.take() else {
            debug!("collector already stopped");
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "collector task join failed");
        }

        info!("collector stopped");
    }

    /// Human-readable summary of the aggregator state for logs and
    /// operator dumps.
    pub fn dump(&self) -> String {
        let cumulative = self.ring.collect_cumulative();
        let windowed = self.ring.collect_ringbuffer_all();

        format!(
            "cumulative: {} frames, {} counts; window: {} frames, {} counts",
            cumulative.frames,
            cumulative.bins.iter().sum::<u64>(),
            windowed.frames,
            windowed.bins.iter().sum::<u64>(),
        )
    }
}

async fn sampling_loop(
    ring: Arc<Ringbuffer>,
    source: Arc<tokio::sync::Mutex<Box<dyn FrameSource>>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("sampling loop stopped");
                return;
            }
            _ = ticker.tick() => {
                let mut source = source.lock().await;
                match source.read_frame() {
                    Ok(frame) => ring.insert(&frame),
                    Err(e) => {
                        warn!(
                            source = source.name(),
                            error = %e,
                            "frame read failed, skipping tick",
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use anyhow::bail;

    use super::*;
    use crate::clock::ScriptedClock;
    use crate::ring::Frame;
    use crate::source::SyntheticSource;

    /// Fails every other read, starting with the first.
    struct FlakySource {
        calls: usize,
    }

    impl FrameSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn read_frame(&mut self) -> anyhow::Result<Frame> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                bail!("transient hardware error");
            }
            Ok(Frame::filled(1))
        }
    }

    fn test_ring(capacity: usize) -> Arc<Ringbuffer> {
        Arc::new(
            Ringbuffer::new(capacity, Box::new(ScriptedClock::free_running()))
                .expect("valid capacity"),
        )
    }

    #[tokio::test]
    async fn test_collects_frames() {
        let ring = test_ring(16);
        let collector = HistogramCollector::new(
            Arc::clone(&ring),
            Box::new(SyntheticSource::new(100)),
            Duration::from_millis(5),
        );

        collector.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        collector.stop().await;

        let sample = ring.collect_cumulative();
        assert!(sample.frames >= 1, "expected frames, got {}", sample.frames);
        assert_eq!(sample.bins.iter().sum::<u64>(), sample.frames * 100);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let ring = test_ring(16);
        let collector = HistogramCollector::new(
            Arc::clone(&ring),
            Box::new(SyntheticSource::new(1)),
            Duration::from_millis(5),
        );

        collector.start().await;
        collector.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        collector.stop().await;

        // A second stop on the already-stopped collector is a no-op.
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let ring = test_ring(4);
        let collector = HistogramCollector::new(
            ring,
            Box::new(SyntheticSource::new(1)),
            Duration::from_millis(5),
        );

        collector.stop().await;
    }

    #[tokio::test]
    async fn test_stop_returns_promptly() {
        let ring = test_ring(4);
        let collector = HistogramCollector::new(
            ring,
            Box::new(SyntheticSource::new(1)),
            Duration::from_secs(60),
        );

        collector.start().await;
        // Let the immediate first tick complete.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let begin = Instant::now();
        collector.stop().await;
        assert!(
            begin.elapsed() < Duration::from_secs(1),
            "stop() waited for the next tick",
        );
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let ring = test_ring(16);
        let collector = HistogramCollector::new(
            Arc::clone(&ring),
            Box::new(SyntheticSource::new(1)),
            Duration::from_millis(5),
        );

        collector.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        collector.stop().await;

        let frames_after_first_run = ring.collect_cumulative().frames;
        assert!(frames_after_first_run >= 1);

        collector.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        collector.stop().await;

        assert!(ring.collect_cumulative().frames > frames_after_first_run);
    }

    #[tokio::test]
    async fn test_source_failure_keeps_sampling() {
        let ring = test_ring(16);
        let collector = HistogramCollector::new(
            Arc::clone(&ring),
            Box::new(FlakySource { calls: 0 }),
            Duration::from_millis(5),
        );

        collector.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        collector.stop().await;

        // The first read fails; any recorded frame proves the loop survived.
        let sample = ring.collect_cumulative();
        assert!(
            sample.frames >= 1,
            "loop should keep running past a failed tick",
        );
    }

    #[tokio::test]
    async fn test_dump_reports_totals() {
        let ring = test_ring(4);
        ring.insert(&Frame::filled(2));
        ring.insert(&Frame::filled(2));

        let collector = HistogramCollector::new(
            Arc::clone(&ring),
            Box::new(SyntheticSource::new(1)),
            Duration::from_millis(5),
        );

        let dump = collector.dump();
        assert!(dump.contains("cumulative: 2 frames"), "dump: {dump}");
        assert!(dump.contains("window: 2 frames"), "dump: {dump}");
        // 2 frames x 256 bins x 2 counts each.
        assert!(dump.contains("1024 counts"), "dump: {dump}");
    }
}
