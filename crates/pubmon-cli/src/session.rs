//! Load-generation session.

use std::sync::Arc;

use pubmon_core::{
    Error as MonitorError, InMemorySink, InstrumentedPublisher, PublishRequest, ReporterTask,
    StatusSnapshot,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{Scenario, SessionConfig};
use crate::error::Error;
use crate::transport::SimulatedTransport;

/// A running publish workload and the instrumentation it owns.
pub struct Session {
    config: SessionConfig,
    sink: Arc<InMemorySink>,
    publisher: Arc<InstrumentedPublisher>,
    transport: Arc<SimulatedTransport>,
}

/// What a finished session reports.
#[derive(Debug)]
pub struct SessionSummary {
    pub status: StatusSnapshot,
    pub prometheus: String,
}

impl Session {
    /// Build a session. At least one scenario is required.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        if config.scenarios.is_empty() {
            return Err(Error::Config("at least one scenario is required".to_string()));
        }

        // The publisher enforces `config.monitor.max_series` itself.
        let sink = InMemorySink::shared();
        let publisher = Arc::new(InstrumentedPublisher::new(&config.monitor, sink.clone()));
        let transport = Arc::new(SimulatedTransport::new(config.transport.clone()));

        Ok(Self {
            config,
            sink,
            publisher,
            transport,
        })
    }

    /// Publish until the configured duration elapses, a shutdown signal
    /// arrives, or a worker hits a fatal instrumentation error.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<SessionSummary, Error> {
        info!(
            scenarios = self.config.scenarios.len(),
            concurrency = self.config.concurrency,
            duration = ?self.config.duration,
            "starting publish session"
        );

        let reporter = ReporterTask::start(
            self.publisher.status_reporter(),
            self.config.monitor.status_frequency,
        );

        if let Some(duration) = self.config.duration {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = shutdown.send(());
            });
        }

        let mut workers = JoinSet::new();
        for worker in 0..self.config.concurrency {
            workers.spawn(publish_loop(
                worker,
                self.config.scenarios.clone(),
                self.publisher.clone(),
                self.transport.clone(),
                shutdown.subscribe(),
            ));
        }

        let mut fatal = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "worker stopped on fatal instrumentation error");
                    let _ = shutdown.send(());
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }

        let mut status_reporter = match reporter.join().await {
            Some(reporter) => reporter,
            None => self.publisher.status_reporter(),
        };
        let status = status_reporter.report();

        if let Some(e) = fatal {
            return Err(e.into());
        }

        Ok(SessionSummary {
            status,
            prometheus: self.sink.to_prometheus(),
        })
    }
}

/// One worker: publish round-robin over the scenarios until shutdown.
async fn publish_loop(
    worker: usize,
    scenarios: Vec<Scenario>,
    publisher: Arc<InstrumentedPublisher>,
    transport: Arc<SimulatedTransport>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), MonitorError> {
    let mut next = worker;

    loop {
        // In-flight publishes finish before the worker exits.
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => return Ok(()),
        }

        let scenario = &scenarios[next % scenarios.len()];
        next = next.wrapping_add(1);
        let request = PublishRequest::new(scenario.name.clone(), scenario.operation_type);

        match publisher.record(request, |r| transport.publish(r)).await {
            Ok(_) => {}
            Err(e) if e.is_registration() => return Err(e),
            // Already classified and tallied; keep publishing.
            Err(_) => tokio::task::yield_now().await,
        }
    }
}
