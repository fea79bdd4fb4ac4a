#![allow(dead_code)]
//! Query iteration throughput across archetype counts and fetch arities.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use loom_ecs::World;

#[derive(Debug, Copy, Clone, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Health(u32);

fn populate(count: u32) -> World {
    let mut world = World::new();
    for i in 0..count {
        let _ = world.spawn_with((
            Position { x: i as f32, y: 0.0 },
            Velocity { x: 1.0, y: 0.0 },
            Health(100),
        ));
    }
    world
}

fn bench_query_single_component(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_single");

    for count in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("iterate", count), &count, |b, &count| {
            let world = populate(count);
            b.iter(|| {
                for pos in world.query::<&Position, ()>() {
                    black_box(pos);
                }
            });
        });
    }

    group.finish();
}

fn bench_query_tuple(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_tuple");

    for count in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("iterate_two_component", count), &count, |b, &count| {
            let world = populate(count);
            b.iter(|| {
                for (pos, vel) in world.query::<(&Position, &Velocity), ()>() {
                    black_box((pos, vel));
                }
            });
        });
    }

    group.finish();
}

fn bench_query_mut(c: &mut Criterion) {
    c.bench_function("query_mut_100k", |b| {
        let mut world = populate(100_000);
        b.iter(|| {
            for (pos, vel) in world.query_mut::<(&mut Position, &Velocity), ()>() {
                pos.x += vel.x;
            }
        });
    });
}

fn bench_query_across_archetypes(c: &mut Criterion) {
    c.bench_function("query_across_archetypes_30k", |b| {
        let mut world = World::new();
        for i in 0..10_000 {
            let _ = world.spawn_with((Position { x: i as f32, y: 0.0 },));
        }
        for i in 0..10_000 {
            let _ = world.spawn_with((Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
        }
        for i in 0..10_000 {
            let _ = world.spawn_with((
                Position { x: i as f32, y: 0.0 },
                Velocity { x: 1.0, y: 0.0 },
                Health(100),
            ));
        }

        b.iter(|| {
            let mut count = 0usize;
            for pos in world.query::<&Position, ()>() {
                black_box(pos);
                count += 1;
            }
            black_box(count);
        });
    });
}

criterion_group!(
    benches,
    bench_query_single_component,
    bench_query_tuple,
    bench_query_mut,
    bench_query_across_archetypes,
);
criterion_main!(benches);
