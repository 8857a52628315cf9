//! Publish instrumentation for transaction load generators.
//!
//! Every publish a load generator makes goes through
//! [`InstrumentedPublisher::record`], which times it, classifies its outcome,
//! and keeps latency metrics per (scenario, status, operation type) along
//! with session-wide success and error counters.
//!
//! # Example
//!
//! ```ignore
//! use pubmon_core::{InMemorySink, InstrumentedPublisher, MonitorConfig, OperationType, PublishRequest, ReporterTask};
//!
//! let config = MonitorConfig::default();
//! let sink = InMemorySink::shared();
//! let publisher = InstrumentedPublisher::new(&config, sink.clone());
//! let reporter = ReporterTask::start(publisher.status_reporter(), config.status_frequency);
//!
//! let request = PublishRequest::new("topic-load", OperationType::ConsensusSubmitMessage);
//! let response = publisher.record(request, |r| transport.publish(r)).await?;
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod publish;
pub mod transaction;

pub use config::MonitorConfig;
pub use error::{Error, PublishError, RegistryError, Result, TransportError};
pub use metrics::{InMemorySink, MeterSink};
pub use publish::{
    Counters, InstrumentedPublisher, MetricRegistry, Outcome, ReporterTask, StatusReporter,
    StatusSnapshot, Tag,
};
pub use transaction::{OperationType, PublishRequest, PublishResponse, Receipt};
