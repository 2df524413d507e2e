use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Counters updated by the pipeline and read by the progress reporter.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub bytes_received: AtomicU64,
    pub bytes_acknowledged: AtomicU64,
    pub parts_dispatched: AtomicU64,
    pub parts_acknowledged: AtomicU64,
    pub retries: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_received: u64,
    pub bytes_acknowledged: u64,
    pub parts_dispatched: u64,
    pub parts_acknowledged: u64,
    pub retries: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_acknowledged: self.bytes_acknowledged.load(Ordering::Relaxed),
            parts_dispatched: self.parts_dispatched.load(Ordering::Relaxed),
            parts_acknowledged: self.parts_acknowledged.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Periodic upload progress logging.
///
/// The stream length is unknown upfront, so progress is reported as bytes
/// acknowledged and throughput rather than a percentage.
pub struct ProgressReporter {
    stats: Arc<PipelineStats>,
    interval: Duration,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(stats: Arc<PipelineStats>, interval: Duration) -> Self {
        Self {
            stats,
            interval,
            start_time: Instant::now(),
        }
    }

    /// Log progress every interval until `done` is cancelled.
    pub fn start_tracking(self, done: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            let mut last_reported = 0u64;
            loop {
                tokio::select! {
                    _ = done.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = self.stats.snapshot();
                if snapshot.bytes_acknowledged == last_reported {
                    continue;
                }
                last_reported = snapshot.bytes_acknowledged;

                info!(
                    "Upload progress: {} bytes in {} parts acknowledged, {} received ({:.2} MB/s)",
                    snapshot.bytes_acknowledged,
                    snapshot.parts_acknowledged,
                    snapshot.bytes_received,
                    throughput_mb_per_sec(snapshot.bytes_acknowledged, self.start_time.elapsed())
                );
            }

            let snapshot = self.stats.snapshot();
            info!(
                "Upload finished: {} bytes in {} parts, {} retries",
                snapshot.bytes_acknowledged, snapshot.parts_acknowledged, snapshot.retries
            );
        })
    }
}

fn throughput_mb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs / 1024.0 / 1024.0
    } else {
        0.0
    }
}
