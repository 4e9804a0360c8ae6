//! Benchmarks for the strata engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use strata::query::{QueryExecutor, QueryRequest, SeriesMatcher};
use strata::storage::{
    Engine, EngineConfig, FieldSpec, GroupSchema, ResourceSchema, TagFamilySpec, TagSpec,
    TimeRange, Value, ValueType, WriteEvent,
};
use tempfile::tempdir;

const HOUR: i64 = 3_600_000_000_000;

fn setup_engine(dir: &std::path::Path) -> Arc<Engine> {
    let engine = Arc::new(Engine::open(EngineConfig::new(dir)).unwrap());
    engine
        .define_group(GroupSchema::new("bench", 2, HOUR))
        .unwrap();
    engine
        .define_resource(
            ResourceSchema::measure("bench", "latency")
                .with_tag_family(TagFamilySpec::new(
                    "default",
                    vec![
                        TagSpec::new("service", ValueType::Str),
                        TagSpec::new("host", ValueType::Str),
                    ],
                ))
                .with_field(FieldSpec::new("value", ValueType::Int64))
                .with_entity(vec!["service", "host"]),
        )
        .unwrap();
    engine
}

fn events(count: usize) -> Vec<WriteEvent> {
    (0..count)
        .map(|i| WriteEvent {
            group: "bench".to_string(),
            resource: "latency".to_string(),
            shard_id: (i % 2) as u32,
            entity_values: vec![Value::Str("svc1".into()), Value::Str("host1".into())],
            timestamp: i as i64 * 1000,
            version: 1,
            tag_families: vec![vec![Value::Str("svc1".into()), Value::Str("host1".into())]],
            fields: vec![Value::Int64(i as i64)],
        })
        .collect()
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("batch_{}", size), |b| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let engine = setup_engine(dir.path());
                    (dir, engine, events(size))
                },
                |(_dir, engine, events)| {
                    engine.write_batch(black_box(events)).unwrap();
                },
            )
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let dir = tempdir().unwrap();
    let engine = setup_engine(dir.path());
    engine.write_batch(events(10_000)).unwrap();
    let executor = Arc::new(QueryExecutor::new(Arc::clone(&engine)));

    for limit in [10, 1000] {
        group.bench_function(format!("desc_limit_{}", limit), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let response = executor
                        .execute(
                            QueryRequest::new("bench", "latency")
                                .with_series(SeriesMatcher::exact(vec![
                                    Value::Str("svc1".into()),
                                    Value::Str("host1".into()),
                                ]))
                                .with_time_range(TimeRange::new(0, i64::MAX / 2))
                                .with_limit(limit)
                                .descending(),
                        )
                        .await
                        .unwrap();
                    black_box(response.len())
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_query);
criterion_main!(benches);
