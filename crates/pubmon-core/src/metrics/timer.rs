//! Latency timer.
//!
//! Fixed-bucket histogram over microseconds. All operations are lock-free,
//! so many publish tasks can record into the same timer concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bucket boundaries in microseconds, tuned for network publish latencies.
const PUBLISH_BUCKETS_US: [u64; 14] = [
    1_000,      // 1 ms
    5_000,      // 5 ms
    10_000,     // 10 ms
    25_000,     // 25 ms
    50_000,     // 50 ms
    100_000,    // 100 ms
    250_000,    // 250 ms
    500_000,    // 500 ms
    1_000_000,  // 1 s
    2_500_000,  // 2.5 s
    5_000_000,  // 5 s
    10_000_000, // 10 s
    30_000_000, // 30 s
    60_000_000, // 60 s
];

/// Fixed-bucket timer for latency measurements.
pub struct Timer {
    /// Bucket upper boundaries in microseconds.
    buckets: Vec<u64>,
    /// Counts per bucket (non-cumulative). The extra last slot holds values
    /// above the largest boundary.
    counts: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Timer {
    /// Create a timer with the default publish latency buckets.
    pub fn new() -> Self {
        Self::with_buckets(PUBLISH_BUCKETS_US.to_vec())
    }

    /// Create a timer with custom bucket boundaries in microseconds.
    ///
    /// Boundaries are sorted and deduplicated.
    pub fn with_buckets(mut buckets: Vec<u64>) -> Self {
        buckets.sort_unstable();
        buckets.dedup();
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record one duration.
    pub fn record(&self, duration: Duration) {
        let value_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.observe(value_us);
    }

    /// Record a value in microseconds.
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value_us, Ordering::Relaxed);

        let index = self.buckets.partition_point(|&boundary| boundary < value_us);
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recordings.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all recorded durations.
    pub fn total(&self) -> Duration {
        Duration::from_micros(self.sum.load(Ordering::Relaxed))
    }

    /// Largest recorded duration.
    pub fn max(&self) -> Duration {
        Duration::from_micros(self.max.load(Ordering::Relaxed))
    }

    /// Mean recorded duration.
    pub fn mean(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.sum.load(Ordering::Relaxed) / count)
    }

    /// Approximate percentile (e.g., 0.99 for P99).
    ///
    /// Returns the upper boundary of the bucket holding the target rank, or
    /// the observed maximum when the rank falls in the overflow bucket.
    pub fn percentile(&self, p: f64) -> Duration {
        let total = self.count();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = ((total as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;

        for (i, count) in self.counts.iter().enumerate() {
            cumulative += count.load(Ordering::Relaxed);
            if cumulative >= target {
                return match self.buckets.get(i) {
                    Some(&boundary) => Duration::from_micros(boundary),
                    None => self.max(),
                };
            }
        }

        self.max()
    }

    /// Snapshot of `(upper boundary in microseconds, cumulative count)`.
    ///
    /// The overflow bucket is reported with `u64::MAX` as its boundary.
    pub fn snapshot(&self) -> Vec<(u64, u64)> {
        let mut cumulative = 0u64;
        self.buckets
            .iter()
            .copied()
            .chain(std::iter::once(u64::MAX))
            .zip(self.counts.iter())
            .map(|(boundary, count)| {
                cumulative += count.load(Ordering::Relaxed);
                (boundary, cumulative)
            })
            .collect()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("count", &self.count())
            .field("total", &self.total())
            .field("max", &self.max())
            .finish()
    }
}
