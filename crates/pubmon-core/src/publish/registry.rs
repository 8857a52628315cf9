//! Per-tag metric handles.
//!
//! Handles are created lazily on first use of a tag and cached for the life
//! of the session. Each map is sharded, so creation only locks the shard that
//! owns the key and lookups of existing handles never block on creation of
//! others.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::counters::Stopwatch;
use super::tag::{ScenarioKey, Tag, TAG_SCENARIO, TAG_STATUS, TAG_TYPE};
use crate::config::MonitorConfig;
use crate::error::RegistryError;
use crate::metrics::{MeterId, SharedSink, TimeGauge, Timer};

const SUBMIT_DESCRIPTION: &str = "The time it takes to submit a transaction";
const HANDLE_DESCRIPTION: &str = "The time it takes from submit to being handled by the main nodes";
const DURATION_DESCRIPTION: &str = "The amount of time this scenario has been publishing transactions";

/// Lazily populated, grow-only cache of tagged metric handles.
pub struct MetricRegistry {
    sink: SharedSink,
    stopwatch: Stopwatch,
    max_series: Option<usize>,
    series: AtomicUsize,
    submit_name: String,
    handle_name: String,
    duration_name: String,
    submit_timers: DashMap<Tag, Arc<Timer>>,
    handle_timers: DashMap<Tag, Arc<Timer>>,
    duration_gauges: DashMap<ScenarioKey, Arc<TimeGauge>>,
}

impl MetricRegistry {
    /// Create a registry that registers into `sink`. Duration gauges sample
    /// `stopwatch`. At most `config.max_series` handles are created.
    pub fn new(config: &MonitorConfig, sink: SharedSink, stopwatch: Stopwatch) -> Self {
        Self {
            sink,
            stopwatch,
            max_series: config.max_series,
            series: AtomicUsize::new(0),
            submit_name: config.submit_metric(),
            handle_name: config.handle_metric(),
            duration_name: config.duration_metric(),
            submit_timers: DashMap::new(),
            handle_timers: DashMap::new(),
            duration_gauges: DashMap::new(),
        }
    }

    /// Get or create the submit latency timer for `tag`.
    pub fn submit_timer(&self, tag: &Tag) -> Result<Arc<Timer>, RegistryError> {
        self.get_or_register(&self.submit_timers, tag, &self.submit_name, || {
            self.sink
                .register_timer(tagged(&self.submit_name, tag), SUBMIT_DESCRIPTION)
        })
    }

    /// Get or create the handle latency timer for `tag`.
    pub fn handle_timer(&self, tag: &Tag) -> Result<Arc<Timer>, RegistryError> {
        self.get_or_register(&self.handle_timers, tag, &self.handle_name, || {
            self.sink
                .register_timer(tagged(&self.handle_name, tag), HANDLE_DESCRIPTION)
        })
    }

    /// Get or create the publishing duration gauge for the tag's scenario
    /// and operation type. The gauge reads the session stopwatch.
    pub fn duration_gauge(&self, tag: &Tag) -> Result<Arc<TimeGauge>, RegistryError> {
        let key = tag.scenario_key();
        self.get_or_register(&self.duration_gauges, &key, &self.duration_name, || {
            let id = MeterId::new(self.duration_name.as_str())
                .with_tag(TAG_SCENARIO, &*key.scenario)
                .with_tag(TAG_TYPE, key.operation_type.as_str());
            let stopwatch = self.stopwatch;
            self.sink
                .register_time_gauge(id, DURATION_DESCRIPTION, Arc::new(move || stopwatch.elapsed()))
        })
    }

    /// Number of handles created so far, across all three maps.
    pub fn series_count(&self) -> usize {
        self.series.load(Ordering::Acquire)
    }

    /// Number of cached submit timers.
    pub fn submit_timer_count(&self) -> usize {
        self.submit_timers.len()
    }

    /// Number of cached handle timers.
    pub fn handle_timer_count(&self) -> usize {
        self.handle_timers.len()
    }

    /// Number of cached duration gauges.
    pub fn duration_gauge_count(&self) -> usize {
        self.duration_gauges.len()
    }

    /// Cached submit timer for `tag`, without creating one.
    pub fn find_submit_timer(&self, tag: &Tag) -> Option<Arc<Timer>> {
        self.submit_timers.get(tag).map(|entry| entry.value().clone())
    }

    /// Cached handle timer for `tag`, without creating one.
    pub fn find_handle_timer(&self, tag: &Tag) -> Option<Arc<Timer>> {
        self.handle_timers.get(tag).map(|entry| entry.value().clone())
    }

    fn get_or_register<K, V, F>(
        &self,
        map: &DashMap<K, Arc<V>>,
        key: &K,
        name: &str,
        create: F,
    ) -> Result<Arc<V>, RegistryError>
    where
        K: std::hash::Hash + Eq + Clone,
        F: FnOnce() -> Result<Arc<V>, RegistryError>,
    {
        get_or_try_insert(map, key, || {
            self.reserve(name)?;
            create().inspect_err(|_| {
                self.series.fetch_sub(1, Ordering::AcqRel);
            })
        })
    }

    /// Claim one slot under the series limit.
    fn reserve(&self, name: &str) -> Result<(), RegistryError> {
        let Some(limit) = self.max_series else {
            self.series.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        self.series
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| RegistryError::CardinalityExceeded {
                name: name.to_string(),
                limit,
            })
    }
}

/// Double-checked get-or-insert: a read on the fast path, then the shard
/// entry lock so that concurrent first uses of a key agree on one handle.
fn get_or_try_insert<K, V, F>(map: &DashMap<K, Arc<V>>, key: &K, create: F) -> Result<Arc<V>, RegistryError>
where
    K: std::hash::Hash + Eq + Clone,
    F: FnOnce() -> Result<Arc<V>, RegistryError>,
{
    if let Some(existing) = map.get(key) {
        return Ok(existing.value().clone());
    }

    match map.entry(key.clone()) {
        Entry::Occupied(entry) => Ok(entry.get().clone()),
        Entry::Vacant(entry) => {
            let handle = create()?;
            entry.insert(handle.clone());
            Ok(handle)
        }
    }
}

fn tagged(name: &str, tag: &Tag) -> MeterId {
    MeterId::new(name)
        .with_tag(TAG_SCENARIO, &**tag.scenario())
        .with_tag(TAG_STATUS, tag.status())
        .with_tag(TAG_TYPE, tag.operation_type().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemorySink;
    use crate::publish::tag::Outcome;
    use crate::transaction::OperationType;
    use std::time::Duration;

    fn registry_with(sink: Arc<InMemorySink>) -> MetricRegistry {
        MetricRegistry::new(&MonitorConfig::default(), sink, Stopwatch::start())
    }

    fn tag(status: Outcome) -> Tag {
        Tag::new(Arc::from("scenario"), status, OperationType::ConsensusSubmitMessage)
    }

    #[test]
    fn test_submit_timer_is_cached() {
        let sink = InMemorySink::shared();
        let registry = registry_with(sink.clone());

        let a = registry.submit_timer(&tag(Outcome::Success)).unwrap();
        let b = registry.submit_timer(&tag(Outcome::Success)).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.submit_timer_count(), 1);
        assert_eq!(sink.series_count(), 1);
    }

    #[test]
    fn test_submit_and_handle_are_separate_series() {
        let sink = InMemorySink::shared();
        let registry = registry_with(sink.clone());
        let t = tag(Outcome::Success);

        let submit = registry.submit_timer(&t).unwrap();
        let handle = registry.handle_timer(&t).unwrap();

        assert!(!Arc::ptr_eq(&submit, &handle));
        let id = MeterId::new("pubmon.publish.handle")
            .with_tag("scenario", "scenario")
            .with_tag("status", "SUCCESS")
            .with_tag("type", "CONSENSUS_SUBMIT_MESSAGE");
        assert!(sink.timer(&id).is_some());
    }

    #[test]
    fn test_duration_gauge_ignores_status() {
        let sink = InMemorySink::shared();
        let registry = registry_with(sink.clone());

        let a = registry.duration_gauge(&tag(Outcome::Success)).unwrap();
        let b = registry
            .duration_gauge(&tag(Outcome::PrecheckError("BUSY".to_string())))
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.duration_gauge_count(), 1);

        let first = a.value();
        std::thread::sleep(Duration::from_millis(5));
        assert!(a.value() > first);
    }

    #[test]
    fn test_registration_failure_is_not_cached() {
        let sink = Arc::new(InMemorySink::with_max_series(1));
        let registry = registry_with(sink);

        registry.submit_timer(&tag(Outcome::Success)).unwrap();
        let err = registry
            .submit_timer(&tag(Outcome::OtherError("Timeout".into())))
            .unwrap_err();

        assert!(matches!(err, RegistryError::CardinalityExceeded { limit: 1, .. }));
        assert_eq!(registry.submit_timer_count(), 1);
    }

    #[test]
    fn test_config_series_limit_applies_to_any_sink() {
        let config = MonitorConfig::default().with_max_series(2);
        let sink = InMemorySink::shared();
        let registry = MetricRegistry::new(&config, sink.clone(), Stopwatch::start());

        let success = tag(Outcome::Success);
        registry.submit_timer(&success).unwrap();
        registry.duration_gauge(&success).unwrap();
        assert_eq!(registry.series_count(), 2);

        // Cached handles stay reachable at the limit.
        assert!(registry.submit_timer(&success).is_ok());

        let err = registry.handle_timer(&success).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CardinalityExceeded {
                name: "pubmon.publish.handle".to_string(),
                limit: 2,
            }
        );
        assert_eq!(registry.series_count(), 2);
        assert_eq!(sink.series_count(), 2);
    }

    #[test]
    fn test_sink_failure_releases_reserved_slot() {
        let config = MonitorConfig::default().with_max_series(5);
        let registry = MetricRegistry::new(
            &config,
            Arc::new(InMemorySink::with_max_series(1)),
            Stopwatch::start(),
        );

        registry.submit_timer(&tag(Outcome::Success)).unwrap();
        assert!(registry.submit_timer(&tag(Outcome::OtherError("Timeout".into()))).is_err());
        assert_eq!(registry.series_count(), 1);
    }

    #[test]
    fn test_concurrent_first_use_yields_one_handle() {
        let registry = Arc::new(registry_with(InMemorySink::shared()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.submit_timer(&tag(Outcome::Success)).unwrap())
            })
            .collect();

        let timers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(timers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.submit_timer_count(), 1);
    }
}
