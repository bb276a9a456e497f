//! Mechanism microbenchmarks using Criterion.
//!
//! These benchmarks measure individual mechanism operations in isolation:
//! - Subject spawn
//! - Serial and concurrent iteration
//! - Trait add/remove (moving between chunks)
//! - Deferred despawn flushing

use apparatus::ecs::{Filter, Mechanism};
use apparatus_bench::traits::*;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn populated(count: usize) -> Mechanism {
    let mut mechanism = Mechanism::new().unwrap();
    for i in 0..count {
        mechanism
            .spawn_with((
                Position {
                    x: i as f32,
                    ..Default::default()
                },
                Velocity {
                    x: 1.0,
                    y: 0.5,
                    z: 0.0,
                },
                Transform::default(),
            ))
            .unwrap();
    }
    mechanism
}

// =============================================================================
// Spawn Benchmarks
// =============================================================================

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("empty", count), &count, |b, &n| {
            b.iter(|| {
                let mut mechanism = Mechanism::new().unwrap();
                for _ in 0..n {
                    black_box(mechanism.spawn().unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("three_traits", count), &count, |b, &n| {
            b.iter(|| black_box(populated(n)));
        });
    }

    group.finish();
}

// =============================================================================
// Iteration Benchmarks
// =============================================================================

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for count in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("serial", count), &count, |b, &n| {
            let mut mechanism = populated(n);
            let chain =
                mechanism.enchain(Filter::make::<(Position, Velocity)>(mechanism.registry()));
            b.iter(|| {
                mechanism
                    .operate::<(&mut Position, &Velocity)>(&chain, |_, (position, velocity)| {
                        position.x += velocity.x;
                        position.y += velocity.y;
                        position.z += velocity.z;
                    })
                    .unwrap();
            });
        });

        for threads in [2, 4, 8] {
            group.bench_with_input(
                BenchmarkId::new(format!("concurrent_{threads}"), count),
                &count,
                |b, &n| {
                    let mut mechanism = populated(n);
                    let chain = mechanism
                        .enchain_solid(Filter::make::<(Position, Velocity)>(mechanism.registry()));
                    b.iter(|| {
                        mechanism
                            .operate_concurrently::<(&mut Position, &Velocity)>(
                                &chain,
                                |_, (position, velocity)| {
                                    position.x += velocity.x;
                                    position.y += velocity.y;
                                    position.z += velocity.z;
                                },
                                threads,
                            )
                            .unwrap();
                    });
                },
            );
        }
    }

    group.finish();
}

// =============================================================================
// Structural Change Benchmarks
// =============================================================================

fn bench_migrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate");

    for count in [100, 1_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("add_remove", count), &count, |b, &n| {
            let mut mechanism = Mechanism::new().unwrap();
            let handles: Vec<_> = (0..n)
                .map(|_| mechanism.spawn_with((Position::default(), Transform::default())))
                .collect::<Result<_, _>>()
                .unwrap();
            b.iter(|| {
                for handle in &handles {
                    mechanism.add_trait(*handle, Marked).unwrap();
                }
                for handle in &handles {
                    mechanism.remove_trait::<Marked>(*handle).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("deferred_despawn", count), &count, |b, &n| {
            b.iter_batched(
                || populated(n),
                |mut mechanism| {
                    let chain =
                        mechanism.enchain(Filter::make::<Position>(mechanism.registry()));
                    mechanism
                        .operate::<()>(&chain, |subject, ()| {
                            let _ = subject.despawn_deferred(false);
                        })
                        .unwrap();
                    mechanism.apply_deferred().unwrap();
                    mechanism
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn, bench_iterate, bench_migrate);
criterion_main!(benches);
