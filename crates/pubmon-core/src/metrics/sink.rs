//! Metrics sink.
//!
//! The sink owns every registered series and is what exporters read from.
//! Registration is idempotent per (name, tag set): registering the same
//! identity twice hands back the existing handle.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::RwLock;

use super::gauge::{Sampler, TimeGauge};
use super::timer::Timer;
use crate::error::RegistryError;

/// Identity of one metric series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId {
    /// Dot-separated metric name.
    pub name: String,
    /// Tags, kept sorted by key so that insertion order does not matter.
    pub tags: Vec<(&'static str, String)>,
}

impl MeterId {
    /// Create an identity with no tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self.tags.sort_by(|a, b| a.0.cmp(b.0));
        self
    }

    /// Look up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Something that can register named, tagged meters and return handles
/// that record into them.
pub trait MeterSink: Send + Sync {
    /// Register (or look up) a timer.
    fn register_timer(&self, id: MeterId, description: &str) -> Result<Arc<Timer>, RegistryError>;

    /// Register (or look up) a sampled duration gauge.
    fn register_time_gauge(
        &self,
        id: MeterId,
        description: &str,
        sampler: Sampler,
    ) -> Result<Arc<TimeGauge>, RegistryError>;
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn MeterSink>;

#[derive(Clone)]
enum Meter {
    Timer(Arc<Timer>),
    TimeGauge(Arc<TimeGauge>),
}

impl Meter {
    fn kind(&self) -> &'static str {
        match self {
            Meter::Timer(_) => "timer",
            Meter::TimeGauge(_) => "gauge",
        }
    }
}

#[derive(Default)]
struct SinkState {
    series: BTreeMap<MeterId, Meter>,
    /// Description and kind per metric name.
    names: BTreeMap<String, (&'static str, String)>,
}

/// In-process sink holding all series in memory.
///
/// Registration takes a write lock, but callers are expected to cache the
/// returned handles so the lock is only hit on the first use of a series.
#[derive(Default)]
pub struct InMemorySink {
    state: RwLock<SinkState>,
    max_series: Option<usize>,
}

impl InMemorySink {
    /// Create an unbounded sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that refuses to hold more than `limit` series.
    pub fn with_max_series(limit: usize) -> Self {
        Self {
            state: RwLock::new(SinkState::default()),
            max_series: Some(limit),
        }
    }

    /// Create an unbounded shared sink.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of registered series.
    pub fn series_count(&self) -> usize {
        self.state.read().series.len()
    }

    /// Look up a registered timer.
    pub fn timer(&self, id: &MeterId) -> Option<Arc<Timer>> {
        match self.state.read().series.get(id) {
            Some(Meter::Timer(timer)) => Some(timer.clone()),
            _ => None,
        }
    }

    /// Look up a registered gauge.
    pub fn time_gauge(&self, id: &MeterId) -> Option<Arc<TimeGauge>> {
        match self.state.read().series.get(id) {
            Some(Meter::TimeGauge(gauge)) => Some(gauge.clone()),
            _ => None,
        }
    }

    /// All registered timers whose name matches.
    pub fn timers_named(&self, name: &str) -> Vec<(MeterId, Arc<Timer>)> {
        self.state
            .read()
            .series
            .iter()
            .filter(|(id, _)| id.name == name)
            .filter_map(|(id, meter)| match meter {
                Meter::Timer(timer) => Some((id.clone(), timer.clone())),
                Meter::TimeGauge(_) => None,
            })
            .collect()
    }

    fn register(
        &self,
        id: MeterId,
        description: &str,
        create: impl FnOnce() -> Meter,
        expected: &'static str,
    ) -> Result<Meter, RegistryError> {
        if let Some(existing) = self.state.read().series.get(&id) {
            return check_kind(&id, existing, expected);
        }

        let mut state = self.state.write();
        if let Some(existing) = state.series.get(&id) {
            return check_kind(&id, existing, expected);
        }
        if let Some((kind, _)) = state.names.get(&id.name) {
            if *kind != expected {
                return Err(RegistryError::KindMismatch {
                    name: id.name,
                    expected,
                });
            }
        }
        if let Some(limit) = self.max_series {
            if state.series.len() >= limit {
                return Err(RegistryError::CardinalityExceeded {
                    name: id.name,
                    limit,
                });
            }
        }

        let meter = create();
        state
            .names
            .entry(id.name.clone())
            .or_insert_with(|| (expected, description.to_string()));
        state.series.insert(id, meter.clone());
        Ok(meter)
    }

    /// Export all series in Prometheus text format.
    ///
    /// Durations are exported in seconds. Timers export a histogram family
    /// plus a separate `_max` gauge family.
    pub fn to_prometheus(&self) -> String {
        let state = self.state.read();
        let mut out = String::new();

        let mut series = state.series.iter().peekable();
        while let Some((first_id, first_meter)) = series.next() {
            let mut family = vec![(first_id, first_meter)];
            while let Some((id, meter)) = series.next_if(|(id, _)| id.name == first_id.name) {
                family.push((id, meter));
            }

            if !out.is_empty() {
                out.push('\n');
            }
            let base = format!("{}_seconds", prometheus_name(&first_id.name));
            let help = state
                .names
                .get(&first_id.name)
                .map(|(_, description)| description.as_str())
                .unwrap_or_default();

            match first_meter {
                Meter::Timer(_) => {
                    write_header(&mut out, &base, help, "histogram");
                    for (id, meter) in &family {
                        if let Meter::Timer(timer) = meter {
                            write_histogram(&mut out, &base, &id.tags, timer);
                        }
                    }
                    let max = format!("{base}_max");
                    write_header(&mut out, &max, help, "gauge");
                    for (id, meter) in &family {
                        if let Meter::Timer(timer) = meter {
                            let labels = format_labels(&id.tags, None);
                            let _ = writeln!(out, "{max}{labels} {}", timer.max().as_secs_f64());
                        }
                    }
                }
                Meter::TimeGauge(_) => {
                    write_header(&mut out, &base, help, "gauge");
                    for (id, meter) in &family {
                        if let Meter::TimeGauge(gauge) = meter {
                            let labels = format_labels(&id.tags, None);
                            let _ = writeln!(out, "{base}{labels} {}", gauge.value().as_secs_f64());
                        }
                    }
                }
            }
        }

        out
    }
}

impl MeterSink for InMemorySink {
    fn register_timer(&self, id: MeterId, description: &str) -> Result<Arc<Timer>, RegistryError> {
        match self.register(id, description, || Meter::Timer(Arc::new(Timer::new())), "timer")? {
            Meter::Timer(timer) => Ok(timer),
            Meter::TimeGauge(_) => unreachable!("kind checked during registration"),
        }
    }

    fn register_time_gauge(
        &self,
        id: MeterId,
        description: &str,
        sampler: Sampler,
    ) -> Result<Arc<TimeGauge>, RegistryError> {
        let create = move || Meter::TimeGauge(Arc::new(TimeGauge::new(sampler)));
        match self.register(id, description, create, "gauge")? {
            Meter::TimeGauge(gauge) => Ok(gauge),
            Meter::Timer(_) => unreachable!("kind checked during registration"),
        }
    }
}

fn check_kind(id: &MeterId, existing: &Meter, expected: &'static str) -> Result<Meter, RegistryError> {
    if existing.kind() == expected {
        Ok(existing.clone())
    } else {
        Err(RegistryError::KindMismatch {
            name: id.name.clone(),
            expected,
        })
    }
}

fn prometheus_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn format_seconds(micros: u64) -> String {
    format!("{}", micros as f64 / 1_000_000.0)
}

fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn write_histogram(out: &mut String, base: &str, tags: &[(&'static str, String)], timer: &Timer) {
    for (boundary, cumulative) in timer.snapshot() {
        let le = if boundary == u64::MAX {
            "+Inf".to_string()
        } else {
            format_seconds(boundary)
        };
        let bucket_labels = format_labels(tags, Some(&le));
        let _ = writeln!(out, "{base}_bucket{bucket_labels} {cumulative}");
    }
    let labels = format_labels(tags, None);
    let _ = writeln!(out, "{base}_count{labels} {}", timer.count());
    let _ = writeln!(out, "{base}_sum{labels} {}", timer.total().as_secs_f64());
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_labels(tags: &[(&'static str, String)], le: Option<&str>) -> String {
    let mut parts: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn submit_id(status: &str) -> MeterId {
        MeterId::new("pubmon.publish.submit")
            .with_tag("scenario", "s1")
            .with_tag("status", status)
            .with_tag("type", "CRYPTO_TRANSFER")
    }

    #[test]
    fn test_register_is_idempotent() {
        let sink = InMemorySink::new();
        let a = sink.register_timer(submit_id("SUCCESS"), "submit").unwrap();
        let b = sink.register_timer(submit_id("SUCCESS"), "submit").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sink.series_count(), 1);
    }

    #[test]
    fn test_tag_order_does_not_matter() {
        let a = MeterId::new("m").with_tag("type", "X").with_tag("scenario", "s");
        let b = MeterId::new("m").with_tag("scenario", "s").with_tag("type", "X");
        assert_eq!(a, b);
        assert_eq!(a.tag("type"), Some("X"));
    }

    #[test]
    fn test_cardinality_limit() {
        let sink = InMemorySink::with_max_series(1);
        sink.register_timer(submit_id("SUCCESS"), "submit").unwrap();

        // Existing series is still returned once the limit is hit.
        assert!(sink.register_timer(submit_id("SUCCESS"), "submit").is_ok());

        let err = sink.register_timer(submit_id("BUSY"), "submit").unwrap_err();
        assert_eq!(
            err,
            RegistryError::CardinalityExceeded {
                name: "pubmon.publish.submit".to_string(),
                limit: 1,
            }
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let sink = InMemorySink::new();
        sink.register_timer(MeterId::new("m"), "a timer").unwrap();

        let err = sink
            .register_time_gauge(MeterId::new("m").with_tag("scenario", "s"), "", Arc::new(|| Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindMismatch { expected: "gauge", .. }));
    }

    #[test]
    fn test_prometheus_format() {
        let sink = InMemorySink::new();
        let timer = sink
            .register_timer(submit_id("SUCCESS"), "The time it takes to submit a transaction")
            .unwrap();
        timer.record(Duration::from_millis(3));
        sink.register_time_gauge(
            MeterId::new("pubmon.publish.duration").with_tag("scenario", "s1"),
            "Publishing duration",
            Arc::new(|| Duration::from_secs(2)),
        )
        .unwrap();

        let text = sink.to_prometheus();

        assert!(text.contains("# TYPE pubmon_publish_submit_seconds histogram"));
        assert!(text.contains(
            "pubmon_publish_submit_seconds_count{scenario=\"s1\",status=\"SUCCESS\",type=\"CRYPTO_TRANSFER\"} 1"
        ));
        assert!(text.contains("le=\"0.005\"} 1"));
        assert!(text.contains("le=\"+Inf\"} 1"));
        assert!(text.contains("# TYPE pubmon_publish_duration_seconds gauge"));
        assert!(text.contains("pubmon_publish_duration_seconds{scenario=\"s1\"} 2"));
    }

    #[test]
    fn test_prometheus_max_is_its_own_gauge_family() {
        let sink = InMemorySink::new();
        sink.register_timer(submit_id("SUCCESS"), "submit")
            .unwrap()
            .record(Duration::from_millis(250));
        sink.register_timer(submit_id("BUSY"), "submit").unwrap();

        let text = sink.to_prometheus();
        let lines: Vec<&str> = text.lines().collect();

        let max_type = lines
            .iter()
            .position(|l| *l == "# TYPE pubmon_publish_submit_seconds_max gauge")
            .expect("max family declared");
        let last_count = lines
            .iter()
            .rposition(|l| l.starts_with("pubmon_publish_submit_seconds_count"))
            .unwrap();
        assert!(last_count < max_type);
        assert!(lines[max_type..].iter().any(|l| l.starts_with(
            "pubmon_publish_submit_seconds_max{scenario=\"s1\",status=\"SUCCESS\",type=\"CRYPTO_TRANSFER\"} 0.25"
        )));
        assert_eq!(text.matches("# TYPE pubmon_publish_submit_seconds histogram").count(), 1);
    }

    #[test]
    fn test_prometheus_escapes_label_values() {
        let sink = InMemorySink::new();
        sink.register_timer(
            MeterId::new("m").with_tag("scenario", "line\nbreak \"quoted\" back\\slash"),
            "",
        )
        .unwrap();

        let text = sink.to_prometheus();
        assert!(text.contains(r#"m_seconds_count{scenario="line\nbreak \"quoted\" back\\slash"} 0"#));
        assert!(text.lines().all(|l| !l.starts_with("break")));
    }

    #[test]
    fn test_timers_named() {
        let sink = InMemorySink::new();
        sink.register_timer(submit_id("SUCCESS"), "").unwrap();
        sink.register_timer(submit_id("BUSY"), "").unwrap();
        sink.register_timer(MeterId::new("other"), "").unwrap();

        assert_eq!(sink.timers_named("pubmon.publish.submit").len(), 2);
        assert!(sink.timer(&submit_id("BUSY")).is_some());
        assert!(sink.time_gauge(&submit_id("BUSY")).is_none());
    }
}
