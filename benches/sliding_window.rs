#![allow(clippy::all)]
//! Benchmarks for the sliding window counters.
//!
//! Tests: local ring buffer increments and snapshots, counter fetch and
//! increment through the trait, distributed counter over the memory store,
//! and a full request decision.

mod common;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use http::{HeaderMap, HeaderValue};
use r0n_dynlimits::clock::ManualClock;
use r0n_dynlimits::modules::catalog::{publish_quotas, update_route_matcher};
use r0n_dynlimits::modules::path_matcher::SharedRouteMatcher;
use r0n_dynlimits::modules::rate_limiting::{
    DefaultApiKeys, DistributedWindowCounter, EvaluatorSettings, LocalWindow, LocalWindowCounter,
    RateLimitEvaluator, WindowCounter,
};
use r0n_dynlimits::store::{KeyLayout, MemoryStore};
use std::hint::black_box;
use std::sync::Arc;

fn bench_local_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window/local");

    group.bench_function("increment_same_second", |b| {
        let mut window = LocalWindow::with_quota(i64::MAX);
        b.iter(|| window.increment(black_box(1_000)));
    });

    group.bench_function("increment_advancing", |b| {
        let mut window = LocalWindow::with_quota(i64::MAX);
        let mut ts = 0i64;
        b.iter(|| {
            ts += 1;
            window.increment(black_box(ts));
        });
    });

    for gap in [1i64, 30, 120] {
        group.bench_with_input(BenchmarkId::new("snapshot_gap", gap), &gap, |b, &gap| {
            let mut window = LocalWindow::with_quota(1_000);
            for ts in 0..60 {
                window.increment(ts);
            }
            b.iter(|| black_box(window.snapshot(59 + gap)));
        });
    }

    group.finish();
}

fn bench_counters(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window/counter");
    let rt = common::bench_runtime();

    let local = LocalWindowCounter::new();
    local.update_quota("K_GET_/a", i64::MAX);
    group.bench_function("local_fetch_increment", |b| {
        b.iter(|| {
            rt.block_on(async {
                let snapshot = local.fetch("K_GET_/a", 1_000).await.unwrap();
                local.increment("K_GET_/a", 1_000).await.unwrap();
                black_box(snapshot)
            })
        });
    });

    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(MemoryStore::with_clock(clock));
    let distributed = DistributedWindowCounter::new(store, KeyLayout::default());
    rt.block_on(distributed.set_quota("K_GET_/a", i64::MAX)).unwrap();
    group.bench_function("distributed_memory_fetch_increment", |b| {
        b.iter(|| {
            rt.block_on(async {
                let snapshot = distributed.fetch("K_GET_/a", 1_000).await.unwrap();
                distributed.increment("K_GET_/a", 1_000).await.unwrap();
                black_box(snapshot)
            })
        });
    });

    group.finish();
}

fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window/decision");
    let rt = common::bench_runtime();

    let catalog = common::catalog(100, 10);
    let matcher = Arc::new(SharedRouteMatcher::new());
    update_route_matcher(&catalog, &matcher);
    let counter = Arc::new(LocalWindowCounter::new());
    rt.block_on(publish_quotas(&catalog, counter.as_ref())).unwrap();
    counter.update_quota("key-3_GET_/v10/orders/{id}", i64::MAX);

    let evaluator = RateLimitEvaluator::new(
        matcher,
        counter,
        Arc::new(DefaultApiKeys),
        Arc::new(ManualClock::new(1_000)),
        EvaluatorSettings::default(),
    );
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static("key-3"));
    let path = common::concrete_path(&catalog.paths[41]);

    group.bench_function("evaluate_allowed", |b| {
        b.iter(|| rt.block_on(evaluator.evaluate("GET", black_box(&path), &headers)));
    });

    group.finish();
}

criterion_group!(benches, bench_local_window, bench_counters, bench_decision);
criterion_main!(benches);
