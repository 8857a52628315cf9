//! Instrumentation configuration.

use std::time::Duration;

/// Default interval between status lines in milliseconds.
pub const DEFAULT_STATUS_FREQUENCY_MS: u64 = 10_000;

/// Default prefix for published metric names.
pub const DEFAULT_METRIC_PREFIX: &str = "pubmon.publish";

/// Publish instrumentation configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between status report ticks.
    pub status_frequency: Duration,

    /// Prefix for metric names (`{prefix}.submit`, `{prefix}.handle`, `{prefix}.duration`).
    pub metric_prefix: String,

    /// Maximum number of series the metrics sink accepts. None means unbounded.
    pub max_series: Option<usize>,
}

impl MonitorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            status_frequency: Duration::from_millis(DEFAULT_STATUS_FREQUENCY_MS),
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            max_series: None,
        }
    }

    /// Set the status report interval.
    pub fn with_status_frequency(mut self, frequency: Duration) -> Self {
        self.status_frequency = frequency;
        self
    }

    /// Set the metric name prefix.
    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    /// Limit the number of series the sink accepts.
    pub fn with_max_series(mut self, limit: usize) -> Self {
        self.max_series = Some(limit);
        self
    }

    /// Remove the series limit.
    pub fn without_max_series(mut self) -> Self {
        self.max_series = None;
        self
    }

    /// Name of the submit latency timer.
    pub fn submit_metric(&self) -> String {
        format!("{}.submit", self.metric_prefix)
    }

    /// Name of the handle latency timer.
    pub fn handle_metric(&self) -> String {
        format!("{}.handle", self.metric_prefix)
    }

    /// Name of the publishing duration gauge.
    pub fn duration_metric(&self) -> String {
        format!("{}.duration", self.metric_prefix)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.status_frequency, Duration::from_millis(10_000));
        assert_eq!(config.metric_prefix, DEFAULT_METRIC_PREFIX);
        assert!(config.max_series.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = MonitorConfig::new()
            .with_status_frequency(Duration::from_secs(1))
            .with_metric_prefix("load.publish")
            .with_max_series(50);

        assert_eq!(config.status_frequency, Duration::from_secs(1));
        assert_eq!(config.max_series, Some(50));
        assert_eq!(config.submit_metric(), "load.publish.submit");
        assert_eq!(config.handle_metric(), "load.publish.handle");
        assert_eq!(config.duration_metric(), "load.publish.duration");

        let config = config.without_max_series();
        assert!(config.max_series.is_none());
    }
}
