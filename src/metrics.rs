use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Percentiles reported for every run
pub const REPORTED_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

/// Latency of one successful request
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct LatencySample {
    pub elapsed_ms: f64,
}

impl LatencySample {
    pub fn from_millis(elapsed_ms: f64) -> Self {
        Self { elapsed_ms }
    }

    /// Convert a measured duration, keeping microsecond resolution
    pub fn from_duration(elapsed: Duration) -> Self {
        Self {
            elapsed_ms: elapsed.as_micros() as f64 / 1000.0,
        }
    }
}

/// Thread-safe accumulator of latency samples shared by all workers
///
/// Recording is the only mutation. All locking for the sample collection
/// lives here so callers never touch the mutex directly.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Mutex<Vec<LatencySample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append a sample under the store's lock
    pub fn record(&self, sample: LatencySample) {
        self.samples.lock().push(sample);
    }

    /// Copy of every sample recorded so far
    ///
    /// Only meaningful once all producers have stopped; the orchestrator
    /// calls this after every worker has been joined.
    pub fn snapshot(&self) -> Vec<LatencySample> {
        self.samples.lock().clone()
    }

    /// Raw millisecond values, ready for aggregation
    pub fn snapshot_millis(&self) -> Vec<f64> {
        self.samples.lock().iter().map(|s| s.elapsed_ms).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Monotonic counter of successfully completed requests
///
/// Read without blocking by the progress reporter while workers increment it.
#[derive(Debug, Default)]
pub struct ProcessedCounter {
    value: AtomicU64,
}

impl ProcessedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one and return the new value
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Mutable state shared by every worker of a run
///
/// A success increments the processed counter and stores its sample on the
/// same path, so the sample count never exceeds the processed count.
#[derive(Debug, Default)]
pub struct RunMetrics {
    samples: SampleStore,
    processed: ProcessedCounter,
    failed: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            samples: SampleStore::new(),
            processed: ProcessedCounter::new(),
            failed: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, sample: LatencySample) {
        self.processed.increment();
        self.samples.record(sample);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.get()
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }
}

/// Latency distribution summary, all values in milliseconds
///
/// A `count` of zero means "no data"; every other field is then zero and
/// must not be read as a real distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub stddev: f64,
}

impl Summary {
    /// Aggregate a finished sample set
    ///
    /// The input is never reordered; sorting happens on a private copy.
    /// `stddev` is the sample standard deviation (divisor `n - 1`) and is
    /// exactly zero for a single sample.
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = sorted.iter().sum();
        let mean = sum / n as f64;

        let variance = if n > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };

        Self {
            count: n,
            min: sorted[0],
            mean,
            max: sorted[n - 1],
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            stddev: variance.sqrt(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reported percentiles as `(percentile, value)` pairs
    pub fn percentiles(&self) -> [(f64, f64); 4] {
        [
            (REPORTED_PERCENTILES[0], self.p50),
            (REPORTED_PERCENTILES[1], self.p90),
            (REPORTED_PERCENTILES[2], self.p95),
            (REPORTED_PERCENTILES[3], self.p99),
        ]
    }
}

/// Percentile of an ascending slice using linear interpolation between
/// order statistics
///
/// `p <= 0` yields the minimum, `p >= 100` the maximum and an empty slice
/// yields zero.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 100.0 {
        return sorted[n - 1];
    }

    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }

    let weight = rank - lo as f64;
    sorted[lo] * (1.0 - weight) + sorted[hi] * weight
}

/// Successful-request throughput over wall-clock run time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub requests_per_second: f64,
    pub total_requests: u64,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn new(total_requests: u64, elapsed: Duration) -> Self {
        let duration_secs = elapsed.as_secs_f64();
        let requests_per_second = if duration_secs > 0.0 {
            total_requests as f64 / duration_secs
        } else {
            0.0
        };

        Self {
            requests_per_second,
            total_requests,
            duration_ns: elapsed.as_nanos() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_summary_known_dataset() {
        let summary = Summary::from_samples(&[30.0, 10.0, 50.0, 20.0, 40.0]);

        assert_eq!(summary.count, 5);
        assert_close(summary.min, 10.0);
        assert_close(summary.max, 50.0);
        assert_close(summary.mean, 30.0);
        assert_close(summary.p50, 30.0);
        assert_close(summary.p90, 46.0);
        assert_close(summary.p95, 48.0);
        assert_close(summary.p99, 49.6);
        // sqrt(1000 / 4)
        assert_close(summary.stddev, 250.0f64.sqrt());
    }

    #[test]
    fn test_summary_empty() {
        let summary = Summary::from_samples(&[]);
        assert!(summary.is_empty());
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_summary_single_sample() {
        let summary = Summary::from_samples(&[12.5]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.stddev, 0.0);
        assert_close(summary.p99, 12.5);
        assert!(!summary.stddev.is_nan());
    }

    #[test]
    fn test_summary_constant_samples() {
        let summary = Summary::from_samples(&[7.0; 9]);
        assert_close(summary.min, 7.0);
        assert_close(summary.mean, 7.0);
        assert_close(summary.max, 7.0);
        assert_close(summary.stddev, 0.0);
    }

    #[test]
    fn test_summary_is_ordered_and_idempotent() {
        let samples: Vec<f64> = (0..257).map(|i| ((i * 7919) % 1000) as f64 / 3.0).collect();
        let original = samples.clone();

        let first = Summary::from_samples(&samples);
        let second = Summary::from_samples(&samples);

        assert_eq!(first, second);
        assert_eq!(samples, original);
        assert!(first.min <= first.p50);
        assert!(first.p50 <= first.p90);
        assert!(first.p90 <= first.p95);
        assert!(first.p95 <= first.p99);
        assert!(first.p99 <= first.max);
    }

    #[test]
    fn test_percentile_clamping() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, -5.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 3.0);
        assert_eq!(percentile(&sorted, 150.0), 3.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_throughput() {
        let metrics = ThroughputMetrics::new(120, Duration::from_secs(60));
        assert_close(metrics.requests_per_second, 2.0);
        assert_eq!(metrics.total_requests, 120);

        let zero = ThroughputMetrics::new(5, Duration::ZERO);
        assert_eq!(zero.requests_per_second, 0.0);
    }

    #[test]
    fn test_sample_from_duration() {
        let sample = LatencySample::from_duration(Duration::from_micros(1500));
        assert_close(sample.elapsed_ms, 1.5);
    }

    #[test]
    fn test_run_metrics_counts() {
        let metrics = RunMetrics::new();
        metrics.record_success(LatencySample::from_millis(10.0));
        metrics.record_success(LatencySample::from_millis(20.0));
        metrics.record_failure();

        assert_eq!(metrics.processed(), 2);
        assert_eq!(metrics.failed(), 1);
        assert_eq!(metrics.samples().len(), 2);
    }

    #[test]
    fn test_sample_store_concurrent_record() {
        let store = Arc::new(SampleStore::new());
        let counter = Arc::new(ProcessedCounter::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.record(LatencySample::from_millis((t * 1000 + i) as f64));
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 2000);
        assert_eq!(counter.get(), 2000);
        assert_eq!(store.snapshot().len(), 2000);
        assert_eq!(Summary::from_samples(&store.snapshot_millis()).count, 2000);
    }
}
