//! In-process metrics sink.
//!
//! Provides the meters the publish instrumentation records into: lock-free
//! latency timers, sampled duration gauges, and a sink that deduplicates
//! series by name and tag set and exports them in Prometheus text format.
//!
//! # Usage
//!
//! ```ignore
//! use pubmon_core::metrics::{InMemorySink, MeterId, MeterSink};
//!
//! let sink = InMemorySink::new();
//! let timer = sink.register_timer(MeterId::new("publish.submit").with_tag("type", "CRYPTO_TRANSFER"), "Submit latency")?;
//! timer.record(std::time::Duration::from_millis(12));
//!
//! let prometheus_text = sink.to_prometheus();
//! ```

mod gauge;
mod sink;
mod timer;

pub use gauge::{Sampler, TimeGauge};
pub use sink::{InMemorySink, MeterId, MeterSink, SharedSink};
pub use timer::Timer;
