//! Publish instrumentation.
//!
//! [`InstrumentedPublisher::record`] wraps one publish call, classifies the
//! result into an [`Outcome`], and updates the per-[`Tag`] timers held by the
//! [`MetricRegistry`] and the session [`Counters`]. A [`StatusReporter`]
//! driven by a single [`ReporterTask`] turns the counters into a periodic
//! throughput line.

mod counters;
mod publisher;
mod registry;
mod reporter;
mod tag;

pub use counters::{Counters, ElapsedDisplay, Stopwatch};
pub use publisher::InstrumentedPublisher;
pub use registry::MetricRegistry;
pub use reporter::{rate, ReporterTask, StatusReporter, StatusSnapshot, MIN_STATUS_FREQUENCY};
pub use tag::{Outcome, ScenarioKey, Tag, SUCCESS, TAG_SCENARIO, TAG_STATUS, TAG_TYPE};
