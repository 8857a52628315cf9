//! Benchmarks for the publish instrumentation hot path.

use std::sync::Arc;
use std::time::SystemTime;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pubmon_core::{
    InMemorySink, InstrumentedPublisher, MonitorConfig, OperationType, PublishRequest,
    PublishResponse, TransportError,
};

fn bench_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let publisher = Arc::new(InstrumentedPublisher::new(
        &MonitorConfig::default(),
        InMemorySink::shared(),
    ));

    let mut group = c.benchmark_group("record");

    group.bench_function("success", |b| {
        b.to_async(&rt).iter(|| {
            let publisher = publisher.clone();
            async move {
                let request = PublishRequest::new("bench", OperationType::CryptoTransfer);
                let response = publisher
                    .record(request, |_| async {
                        Ok(PublishResponse::new(SystemTime::now(), "tx"))
                    })
                    .await;
                black_box(response)
            }
        })
    });

    group.bench_function("precheck_failure", |b| {
        b.to_async(&rt).iter(|| {
            let publisher = publisher.clone();
            async move {
                let request = PublishRequest::new("bench", OperationType::CryptoTransfer);
                let response = publisher
                    .record(request, |_| async {
                        Err(TransportError::precheck("BUSY", "tx", "busy"))
                    })
                    .await;
                black_box(response.is_err())
            }
        })
    });

    group.finish();
}

fn bench_record_many_tags(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("record_tags");

    for scenarios in [1usize, 16, 256] {
        let publisher = Arc::new(InstrumentedPublisher::new(
            &MonitorConfig::default(),
            InMemorySink::shared(),
        ));
        let names: Vec<Arc<str>> = (0..scenarios)
            .map(|i| Arc::from(format!("scenario-{i}")))
            .collect();
        let mut next = 0usize;

        group.bench_with_input(BenchmarkId::from_parameter(scenarios), &scenarios, |b, _| {
            b.to_async(&rt).iter(|| {
                let request = PublishRequest::new(names[next % names.len()].clone(), OperationType::TokenMint);
                next += 1;
                let publisher = publisher.clone();
                async move {
                    let response = publisher
                        .record(request, |_| async {
                            Ok(PublishResponse::new(SystemTime::now(), "tx"))
                        })
                        .await;
                    black_box(response)
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_record_many_tags);
criterion_main!(benches);
