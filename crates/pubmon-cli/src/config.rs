//! Session configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pubmon_core::config::{DEFAULT_METRIC_PREFIX, DEFAULT_STATUS_FREQUENCY_MS};
use pubmon_core::{MonitorConfig, OperationType};

use crate::error::Error;
use crate::transport::TransportProfile;

/// Default number of concurrent publish workers.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default simulated network latency in milliseconds.
pub const DEFAULT_LATENCY_MS: u64 = 20;

/// A named workload publishing one kind of transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: Arc<str>,
    pub operation_type: OperationType,
}

impl FromStr for Scenario {
    type Err = Error;

    /// Parses `NAME=TYPE`, or a bare `TYPE` used as its own name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, operation_type) = match s.split_once('=') {
            Some((name, op)) => (name.trim(), op.trim()),
            None => (s.trim(), s.trim()),
        };
        if name.is_empty() {
            return Err(Error::Config(format!("scenario name is empty in '{s}'")));
        }
        let operation_type = operation_type
            .parse()
            .map_err(|e| Error::Config(format!("invalid scenario '{s}': {e}")))?;

        Ok(Self {
            name: Arc::from(name),
            operation_type,
        })
    }
}

/// Load-generation session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Instrumentation settings.
    pub monitor: MonitorConfig,

    /// Workloads, published round-robin.
    pub scenarios: Vec<Scenario>,

    /// How long to run. None runs until interrupted.
    pub duration: Option<Duration>,

    /// Number of concurrent publish workers.
    pub concurrency: usize,

    /// Behaviour of the simulated transport.
    pub transport: TransportProfile,

    /// Print the Prometheus export after the run.
    pub print_metrics: bool,

    /// Print the final status as JSON.
    pub json: bool,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "pubmon")]
#[command(version, about = "Publish load generator with live throughput reporting", long_about = None)]
pub struct Args {
    /// Workload as NAME=TYPE (repeatable).
    #[arg(short, long = "scenario", default_value = "CONSENSUS_SUBMIT_MESSAGE=CONSENSUS_SUBMIT_MESSAGE")]
    pub scenarios: Vec<String>,

    /// Run time in seconds. Set to 0 to run until ctrl-c.
    #[arg(short, long, default_value_t = 30)]
    pub duration: u64,

    /// Concurrent publish workers.
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Status report interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_STATUS_FREQUENCY_MS)]
    pub status_frequency: u64,

    /// Mean simulated submit latency in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LATENCY_MS)]
    pub latency_ms: u64,

    /// Fraction of publishes rejected at precheck (0.0 - 1.0).
    #[arg(long, default_value_t = 0.01)]
    pub precheck_error_rate: f64,

    /// Fraction of publishes failing their receipt (0.0 - 1.0).
    #[arg(long, default_value_t = 0.005)]
    pub receipt_error_rate: f64,

    /// Fraction of publishes timing out (0.0 - 1.0).
    #[arg(long, default_value_t = 0.001)]
    pub timeout_rate: f64,

    /// Percentage of successful publishes that wait for a receipt.
    #[arg(long, default_value_t = 10)]
    pub receipt_percent: u8,

    /// Maximum metric series before registration fails.
    #[arg(long)]
    pub max_series: Option<usize>,

    /// Prefix for metric names.
    #[arg(long, default_value = DEFAULT_METRIC_PREFIX)]
    pub metric_prefix: String,

    /// Log filter (overrides RUST_LOG).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the Prometheus export after the run.
    #[arg(long)]
    pub print_metrics: bool,

    /// Print the final status as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Convert command-line arguments to session configuration.
    pub fn into_config(self) -> Result<SessionConfig, Error> {
        let scenarios = self
            .scenarios
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<Scenario>, _>>()?;
        if scenarios.is_empty() {
            return Err(Error::Config("at least one scenario is required".to_string()));
        }

        let mut monitor = MonitorConfig::new()
            .with_status_frequency(Duration::from_millis(self.status_frequency.max(1)))
            .with_metric_prefix(self.metric_prefix);
        if let Some(limit) = self.max_series {
            monitor = monitor.with_max_series(limit);
        }

        let transport = TransportProfile {
            latency: Duration::from_millis(self.latency_ms),
            precheck_error_rate: probability("precheck-error-rate", self.precheck_error_rate)?,
            receipt_error_rate: probability("receipt-error-rate", self.receipt_error_rate)?,
            timeout_rate: probability("timeout-rate", self.timeout_rate)?,
            receipt_ratio: probability("receipt-percent", f64::from(self.receipt_percent) / 100.0)?,
        };

        let duration = if self.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(self.duration))
        };

        Ok(SessionConfig {
            monitor,
            scenarios,
            duration,
            concurrency: self.concurrency.max(1),
            transport,
            print_metrics: self.print_metrics,
            json: self.json,
        })
    }
}

fn probability(name: &str, value: f64) -> Result<f64, Error> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!("{name} must be between 0 and 1, got {value}")))
    }
}
