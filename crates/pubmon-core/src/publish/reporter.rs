//! Periodic throughput and error reporting.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::counters::{Counters, ElapsedDisplay};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Shortest interval a [`ReporterTask`] ticks at.
pub const MIN_STATUS_FREQUENCY: Duration = Duration::from_millis(1);

/// Values computed by one reporter tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Total successful publishes.
    pub count: u64,
    /// Session elapsed time in microseconds.
    pub elapsed_micros: u64,
    /// Publishes per second since the session started.
    pub average_rate: f64,
    /// Publishes since the previous tick.
    pub instant_count: u64,
    /// Microseconds since the previous tick.
    pub instant_elapsed_micros: u64,
    /// Seconds since the previous tick, rounded to two places.
    pub instant_seconds: f64,
    /// Publishes per second since the previous tick.
    pub instant_rate: f64,
    /// Failures by status label.
    pub errors: BTreeMap<String, u64>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Published {} transactions in {} at {:.1}/s, {} transactions in last {:.2} s at {:.1}/s. Errors: {{",
            self.count,
            ElapsedDisplay(Duration::from_micros(self.elapsed_micros)),
            self.average_rate,
            self.instant_count,
            self.instant_seconds,
            self.instant_rate,
        )?;
        for (i, (label, count)) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{label}={count}")?;
        }
        f.write_str("}")
    }
}

/// Samples the counters and computes average and interval throughput.
///
/// `status` takes `&mut self`, so the "last sample" memory has exactly one
/// writer. Run it from a single [`ReporterTask`].
pub struct StatusReporter {
    counters: Arc<Counters>,
    last_count: u64,
    last_elapsed: u64,
}

impl StatusReporter {
    /// Create a reporter over `counters`.
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            last_count: 0,
            last_elapsed: 0,
        }
    }

    /// Sample the counters and advance the interval window.
    pub fn status(&mut self) -> StatusSnapshot {
        let count = self.counters.success_count();
        let elapsed = self.counters.stopwatch().elapsed_micros();
        let snapshot = self.compute(count, elapsed);
        self.last_count = count;
        self.last_elapsed = elapsed;
        snapshot
    }

    /// Sample, log the status line, and advance the window.
    pub fn report(&mut self) -> StatusSnapshot {
        let snapshot = self.status();
        info!(
            count = snapshot.count,
            average_rate = snapshot.average_rate,
            instant_count = snapshot.instant_count,
            instant_rate = snapshot.instant_rate,
            "{snapshot}"
        );
        snapshot
    }

    fn compute(&self, count: u64, elapsed: u64) -> StatusSnapshot {
        let instant_count = count.saturating_sub(self.last_count);
        let instant_elapsed = elapsed.saturating_sub(self.last_elapsed);

        StatusSnapshot {
            count,
            elapsed_micros: elapsed,
            average_rate: rate(count, elapsed),
            instant_count,
            instant_elapsed_micros: instant_elapsed,
            instant_seconds: round(instant_elapsed as f64 / MICROS_PER_SECOND, 2),
            instant_rate: rate(instant_count, instant_elapsed),
            errors: self.counters.error_snapshot(),
        }
    }
}

/// Publishes per second, rounded to one decimal place. Zero when no time
/// has elapsed.
pub fn rate(count: u64, elapsed_micros: u64) -> f64 {
    if elapsed_micros == 0 {
        return 0.0;
    }
    round(count as f64 * MICROS_PER_SECOND / elapsed_micros as f64, 1)
}

/// Round half away from zero to `places` decimal places.
fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Handle for the background status reporting task.
///
/// The task owns its [`StatusReporter`], so at most one tick runs at a time.
pub struct ReporterTask {
    handle: JoinHandle<StatusReporter>,
    stop_tx: watch::Sender<bool>,
}

impl ReporterTask {
    /// Start reporting every `frequency`, first tick one `frequency` from now.
    ///
    /// A zero `frequency` is raised to [`MIN_STATUS_FREQUENCY`].
    pub fn start(reporter: StatusReporter, frequency: Duration) -> Self {
        Self::start_with(reporter, frequency, |reporter| {
            reporter.report();
        })
    }

    fn start_with<F>(mut reporter: StatusReporter, frequency: Duration, mut tick: F) -> Self
    where
        F: FnMut(&mut StatusReporter) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        if frequency < MIN_STATUS_FREQUENCY {
            warn!(
                frequency_ms = frequency.as_millis() as u64,
                min_ms = MIN_STATUS_FREQUENCY.as_millis() as u64,
                "status frequency too small, using minimum"
            );
        }
        let frequency = frequency.max(MIN_STATUS_FREQUENCY);

        let handle = tokio::spawn(async move {
            info!(frequency_ms = frequency.as_millis() as u64, "status reporter started");

            let mut ticker = tokio::time::interval(frequency);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| tick(&mut reporter))) {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(error = %message, "status report failed");
                }
            }

            info!("status reporter stopping");
            reporter
        });

        Self { handle, stop_tx }
    }

    /// Signal the task to stop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the task and take back its reporter.
    pub async fn join(self) -> Option<StatusReporter> {
        self.stop();
        match self.handle.await {
            Ok(reporter) => Some(reporter),
            Err(e) => {
                warn!(error = %e, "status reporter task failed");
                None
            }
        }
    }
}
