//! Publish counters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Monotonic elapsed-time source started once and never reset.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started_at: Instant,
}

impl Stopwatch {
    /// Start a new stopwatch.
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Time since the stopwatch was started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Elapsed time in whole microseconds.
    pub fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Renders a duration with four significant digits in the largest unit that
/// keeps the value at or above one (e.g. `2.000 s`, `1.500 min`, `12.50 ms`).
pub struct ElapsedDisplay(pub Duration);

impl fmt::Display for ElapsedDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(&str, f64); 7] = [
            ("d", 86_400e9),
            ("h", 3_600e9),
            ("min", 60e9),
            ("s", 1e9),
            ("ms", 1e6),
            ("\u{3bc}s", 1e3),
            ("ns", 1.0),
        ];

        let nanos = self.0.as_nanos() as f64;
        let (unit, scale) = UNITS
            .iter()
            .copied()
            .find(|(_, scale)| nanos >= *scale)
            .unwrap_or(("ns", 1.0));
        let value = nanos / scale;

        // Four significant digits.
        let integer_digits = if value < 1.0 {
            1
        } else {
            value.log10().floor() as usize + 1
        };
        let precision = 4usize.saturating_sub(integer_digits);
        write!(f, "{value:.precision$} {unit}")
    }
}

/// Success counter, error tally and session stopwatch.
///
/// Every field is updated without a session-wide lock: the success count is a
/// single atomic and the error tally is a sharded map of atomics.
pub struct Counters {
    success: AtomicU64,
    errors: DashMap<String, AtomicU64>,
    stopwatch: Stopwatch,
}

impl Counters {
    /// Create zeroed counters and start the stopwatch.
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            errors: DashMap::new(),
            stopwatch: Stopwatch::start(),
        }
    }

    /// Record one successful publish.
    pub fn increment_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of successful publishes.
    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    /// Record one failed publish under `label`.
    pub fn increment_error(&self, label: &str) {
        if let Some(count) = self.errors.get(label) {
            count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.errors
            .entry(label.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Count of failures recorded under `label`.
    pub fn error_count(&self, label: &str) -> u64 {
        self.errors
            .get(label)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total failures across all labels.
    pub fn total_errors(&self) -> u64 {
        self.errors
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Copy of the error tally, sorted by label.
    ///
    /// Each shard is read-locked only while it is copied, so concurrent
    /// increments are delayed at most briefly. The copy is not a consistent
    /// cut across shards.
    pub fn error_snapshot(&self) -> BTreeMap<String, u64> {
        self.errors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// The session stopwatch.
    pub fn stopwatch(&self) -> Stopwatch {
        self.stopwatch
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_success_count() {
        let counters = Counters::new();
        counters.increment_success();
        counters.increment_success();

        assert_eq!(counters.success_count(), 2);
        assert_eq!(counters.total_errors(), 0);
    }

    #[test]
    fn test_error_tally() {
        let counters = Counters::new();
        counters.increment_error("BUSY");
        counters.increment_error("BUSY");
        counters.increment_error("Timeout");

        assert_eq!(counters.error_count("BUSY"), 2);
        assert_eq!(counters.error_count("INVALID_SIGNATURE"), 0);
        assert_eq!(counters.total_errors(), 3);

        let snapshot = counters.error_snapshot();
        assert_eq!(
            snapshot.into_iter().collect::<Vec<_>>(),
            vec![("BUSY".to_string(), 2), ("Timeout".to_string(), 1)]
        );
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let counters = Arc::new(Counters::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        counters.increment_success();
                        counters.increment_error("BUSY");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(counters.success_count(), 8_000);
        assert_eq!(counters.error_count("BUSY"), 8_000);
    }

    #[test]
    fn test_stopwatch_is_monotonic() {
        let counters = Counters::new();
        let first = counters.stopwatch().elapsed_micros();
        std::thread::sleep(Duration::from_millis(2));
        assert!(counters.stopwatch().elapsed_micros() >= first + 2_000);
    }

    #[test]
    fn test_elapsed_display() {
        assert_eq!(ElapsedDisplay(Duration::from_secs(2)).to_string(), "2.000 s");
        assert_eq!(ElapsedDisplay(Duration::from_secs(90)).to_string(), "1.500 min");
        assert_eq!(ElapsedDisplay(Duration::from_micros(12_500)).to_string(), "12.50 ms");
        assert_eq!(ElapsedDisplay(Duration::from_millis(250)).to_string(), "250.0 ms");
        assert_eq!(ElapsedDisplay(Duration::ZERO).to_string(), "0.000 ns");
    }
}
