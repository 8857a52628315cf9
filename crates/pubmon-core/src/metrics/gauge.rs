//! Sampled duration gauge.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Function sampled on every gauge read.
pub type Sampler = Arc<dyn Fn() -> Duration + Send + Sync>;

/// A gauge whose value is a duration computed when it is read.
///
/// Nothing is recorded into it; the sampler is the source of truth.
pub struct TimeGauge {
    sampler: Sampler,
}

impl TimeGauge {
    /// Create a gauge backed by `sampler`.
    pub fn new(sampler: Sampler) -> Self {
        Self { sampler }
    }

    /// Sample the current value.
    pub fn value(&self) -> Duration {
        (self.sampler)()
    }
}

impl fmt::Debug for TimeGauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeGauge").field("value", &self.value()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_gauge_samples_on_read() {
        let source = Arc::new(AtomicU64::new(5));
        let sampled = source.clone();
        let gauge = TimeGauge::new(Arc::new(move || {
            Duration::from_millis(sampled.load(Ordering::Relaxed))
        }));

        assert_eq!(gauge.value(), Duration::from_millis(5));
        source.store(9, Ordering::Relaxed);
        assert_eq!(gauge.value(), Duration::from_millis(9));
    }
}
