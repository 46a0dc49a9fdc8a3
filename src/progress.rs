//! Periodic progress reporting
//!
//! Reads the run counters without taking any lock and hands a snapshot to
//! the run's [`Reporter`] once per interval.

use crate::metrics::RunMetrics;
use crate::results::Reporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a running benchmark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub processed: u64,
    pub failed: u64,
    pub elapsed: Duration,
    /// Average successful-request rate since the run started
    pub requests_per_second: f64,
}

impl ProgressUpdate {
    pub fn capture(metrics: &RunMetrics, elapsed: Duration) -> Self {
        let processed = metrics.processed();
        let secs = elapsed.as_secs_f64();
        Self {
            processed,
            failed: metrics.failed(),
            elapsed,
            requests_per_second: if secs > 0.0 {
                processed as f64 / secs
            } else {
                0.0
            },
        }
    }
}

pub struct ProgressReporter {
    metrics: Arc<RunMetrics>,
    reporter: Arc<dyn Reporter>,
    interval: Duration,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(
        metrics: Arc<RunMetrics>,
        reporter: Arc<dyn Reporter>,
        interval: Duration,
        started: Instant,
    ) -> Self {
        Self {
            metrics,
            reporter,
            interval,
            started,
        }
    }

    /// Emit updates until `stop` fires; returns the number of updates sent
    pub async fn run(self, stop: CancellationToken) -> u64 {
        if self.interval.is_zero() {
            return 0;
        }

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::from_std(self.started) + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sent = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let update = ProgressUpdate::capture(&self.metrics, self.started.elapsed());
                    self.reporter.progress(&update);
                    sent += 1;
                }
            }
        }
        sent
    }
}
