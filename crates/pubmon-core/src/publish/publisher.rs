//! Instrumented publish calls.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, error};

use super::counters::Counters;
use super::registry::MetricRegistry;
use super::reporter::StatusReporter;
use super::tag::{Outcome, Tag};
use crate::config::MonitorConfig;
use crate::error::{Error, PublishError, RegistryError, Result, TransportError};
use crate::metrics::SharedSink;
use crate::transaction::{OperationType, PublishRequest, PublishResponse};

/// Wraps publish calls, classifies their outcome and keeps per-tag latency
/// metrics and session counters.
///
/// One instance is owned by a load-generation session and shared (behind an
/// `Arc`) by every task that publishes.
pub struct InstrumentedPublisher {
    registry: MetricRegistry,
    counters: Arc<Counters>,
}

impl InstrumentedPublisher {
    /// Create a publisher that registers its metrics into `sink`, creating
    /// no more than `config.max_series` series.
    pub fn new(config: &MonitorConfig, sink: SharedSink) -> Self {
        let counters = Arc::new(Counters::new());
        let registry = MetricRegistry::new(config, sink, counters.stopwatch());
        Self { registry, counters }
    }

    /// Session counters.
    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Tagged metric handles.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Create a reporter over this publisher's counters.
    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(self.counters.clone())
    }

    /// Run `publish` on `request` and record its outcome.
    ///
    /// Successful responses are returned unchanged. Any failure comes back as
    /// [`Error::Publish`] wrapping the original transport error. If the
    /// returned future is dropped before `publish` completes, the call is
    /// still recorded as a `Cancelled` failure, or as `Panicked` when the
    /// drop happens while unwinding.
    pub async fn record<F, Fut>(&self, request: PublishRequest, publish: F) -> Result<PublishResponse>
    where
        F: FnOnce(PublishRequest) -> Fut,
        Fut: Future<Output = std::result::Result<PublishResponse, TransportError>>,
    {
        let mut in_flight = InFlight {
            publisher: self,
            scenario: request.scenario_name.clone(),
            operation_type: request.operation_type,
            start: SystemTime::now(),
            armed: true,
        };

        let result = publish(request).await;
        in_flight.armed = false;

        let scenario = in_flight.scenario.clone();
        let operation_type = in_flight.operation_type;
        let start = in_flight.start;

        match result {
            Ok(response) => {
                self.counters.increment_success();
                match self.complete(&scenario, operation_type, start, Some(&response), Outcome::Success) {
                    Ok(()) => Ok(response),
                    Err(source) => Err(Error::Registration {
                        source,
                        publish: None,
                    }),
                }
            }
            Err(source) => {
                let outcome = Outcome::classify(&source);
                log_failure(&source, operation_type);
                let failure = PublishError::new(
                    scenario.clone(),
                    operation_type,
                    outcome.status_label(),
                    source,
                );
                match self.complete(&scenario, operation_type, start, None, outcome) {
                    Ok(()) => Err(Error::Publish(failure)),
                    Err(source) => Err(Error::Registration {
                        source,
                        publish: Some(failure),
                    }),
                }
            }
        }
    }

    /// Update the error tally and the tagged metrics for a finished call.
    fn complete(
        &self,
        scenario: &Arc<str>,
        operation_type: OperationType,
        start: SystemTime,
        response: Option<&PublishResponse>,
        outcome: Outcome,
    ) -> std::result::Result<(), RegistryError> {
        if !outcome.is_success() {
            self.counters.increment_error(outcome.status_label());
        }

        let end = response.map(|r| r.timestamp).unwrap_or_else(SystemTime::now);
        let tag = Tag::new(scenario.clone(), outcome, operation_type);

        self.registry.submit_timer(&tag)?.record(since(start, end));
        self.registry.duration_gauge(&tag)?;

        if response.is_some_and(PublishResponse::has_receipt) {
            let elapsed = since(start, SystemTime::now());
            self.registry.handle_timer(&tag)?.record(elapsed);
        }

        Ok(())
    }
}

/// Status label of a publish whose future panicked.
const PANICKED: &str = "Panicked";

/// Records a `Cancelled` (or `Panicked`) outcome if the publish future is
/// dropped mid-flight.
struct InFlight<'a> {
    publisher: &'a InstrumentedPublisher,
    scenario: Arc<str>,
    operation_type: OperationType,
    start: SystemTime,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let cause = if std::thread::panicking() {
            debug!(
                scenario = %self.scenario,
                operation_type = %self.operation_type,
                "publish panicked before completion"
            );
            TransportError::other(PANICKED, "publish panicked before completion")
        } else {
            debug!(
                scenario = %self.scenario,
                operation_type = %self.operation_type,
                "publish cancelled before completion"
            );
            TransportError::Cancelled
        };
        let outcome = Outcome::classify(&cause);
        if let Err(e) = self
            .publisher
            .complete(&self.scenario, self.operation_type, self.start, None, outcome)
        {
            error!(error = %e, scenario = %self.scenario, "failed to record interrupted publish");
        }
    }
}

fn log_failure(error: &TransportError, operation_type: OperationType) {
    match error {
        TransportError::Precheck {
            status, message, ..
        } => {
            debug!(%status, %operation_type, %message, "network error submitting transaction");
        }
        TransportError::Receipt {
            status,
            transaction_id,
        } => {
            debug!(%status, %operation_type, %transaction_id, "consensus error for transaction");
        }
        other => {
            debug!(%operation_type, error = %other, "failure submitting transaction");
        }
    }
}

/// Non-negative time between two wall-clock readings.
fn since(start: SystemTime, end: SystemTime) -> Duration {
    end.duration_since(start).unwrap_or(Duration::ZERO)
}
