//! Bubble cage benchmarks using Criterion.
//!
//! These benchmarks measure whole cage steps over seeded bubble clouds:
//! - Full step (pull, flush, evaluate)
//! - Evaluation alone at several worker counts

use apparatus_bench::scenarios::{BubbleConfig, BubbleScenario, Scenario};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cage/step");

    for count in [1_000, 10_000, 50_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("frame", count), &count, |b, &n| {
            let mut scenario = BubbleScenario::with_config(BubbleConfig {
                bubble_count: n,
                ..Default::default()
            });
            scenario.setup();

            b.iter(|| {
                scenario.update();
            });
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("cage/evaluate");
    let count = 20_000;
    group.throughput(Throughput::Elements(count as u64));

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &t| {
            let mut scenario = BubbleScenario::with_config(BubbleConfig {
                bubble_count: count,
                thread_count: t,
                ..Default::default()
            });
            scenario.setup();

            b.iter(|| {
                scenario.evaluate();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_evaluate);
criterion_main!(benches);
