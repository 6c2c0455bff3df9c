//! Benchmarks for impulse2d
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use impulse2d::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn config(workers: usize) -> WorldConfig {
    WorldConfig {
        workers,
        ..WorldConfig::default()
    }
}

fn add_floor(world: &mut World) {
    let floor = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_fixture(floor, &FixtureDef::new(Shape::rect(100.0, 1.0)))
        .unwrap();
}

/// Pyramid of boxes, `base` wide at the bottom.
fn pyramid_world(base: usize, workers: usize) -> World {
    let mut world = World::new(config(workers));
    add_floor(&mut world);
    for row in 0..base {
        for col in 0..(base - row) {
            let x = col as f32 * 1.05 + row as f32 * 0.525;
            let y = 1.55 + row as f32 * 1.05;
            let h = world
                .create_body(&BodyDef::dynamic().at(Vec2::new(x, y)))
                .unwrap();
            world
                .create_fixture(h, &FixtureDef::new(Shape::rect(0.5, 0.5)))
                .unwrap();
        }
    }
    world
}

// ============================================================================
// Step benchmarks
// ============================================================================

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    group.bench_function("single_body_60_steps", |b| {
        b.iter(|| {
            let mut world = World::new(config(1));
            let body = world
                .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 100.0)))
                .unwrap();
            world
                .create_fixture(body, &FixtureDef::new(Shape::circle(0.5)))
                .unwrap();
            for _ in 0..60 {
                world.step(black_box(DT), 8, 3);
            }
            world.body(body).unwrap().position()
        });
    });

    group.bench_function("pyramid_10_60_steps", |b| {
        b.iter(|| {
            let mut world = pyramid_world(10, 1);
            for _ in 0..60 {
                world.step(black_box(DT), 8, 3);
            }
            world.profile().islands
        });
    });

    group.bench_function("pyramid_10_60_steps_4_workers", |b| {
        b.iter(|| {
            let mut world = pyramid_world(10, 4);
            for _ in 0..60 {
                world.step(black_box(DT), 8, 3);
            }
            world.profile().islands
        });
    });

    group.finish();
}

// ============================================================================
// Continuous collision benchmarks
// ============================================================================

fn bench_toi(c: &mut Criterion) {
    let mut group = c.benchmark_group("continuous");

    group.bench_function("bullets_vs_thin_walls", |b| {
        b.iter(|| {
            let mut world = World::new(WorldConfig {
                gravity: Vec2::ZERO,
                workers: 1,
                ..WorldConfig::default()
            });
            for i in 0..8 {
                let y = i as f32 * 2.0;
                let wall = world
                    .create_body(&BodyDef::default().at(Vec2::new(5.0, y)))
                    .unwrap();
                world
                    .create_fixture(wall, &FixtureDef::new(Shape::rect(0.05, 0.8)))
                    .unwrap();
                let bullet = world
                    .create_body(
                        &BodyDef::dynamic()
                            .at(Vec2::new(0.0, y))
                            .with_velocity(Vec2::new(90.0, 0.0))
                            .as_bullet(),
                    )
                    .unwrap();
                world
                    .create_fixture(bullet, &FixtureDef::new(Shape::circle(0.1)))
                    .unwrap();
            }
            for _ in 0..10 {
                world.step(black_box(DT), 8, 3);
            }
            world.profile().toi_queries
        });
    });

    group.finish();
}

// ============================================================================
// Query benchmarks
// ============================================================================

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    // Settled grid of static circles for the broad phase to index.
    let mut world = World::new(config(1));
    for i in 0..32 {
        for j in 0..32 {
            let body = world
                .create_body(
                    &BodyDef::default().at(Vec2::new(i as f32 * 2.0, j as f32 * 2.0)),
                )
                .unwrap();
            world
                .create_fixture(body, &FixtureDef::new(Shape::circle(0.5)))
                .unwrap();
        }
    }
    world.step(DT, 1, 1);

    group.bench_function("aabb_query_1k_fixtures", |b| {
        let probe = Aabb::new(Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0));
        b.iter(|| {
            let mut count = 0u32;
            world.query_aabb(black_box(&probe), |_| {
                count += 1;
                true
            });
            count
        });
    });

    group.bench_function("ray_cast_1k_fixtures", |b| {
        b.iter(|| {
            let mut closest = 1.0f32;
            world.ray_cast(
                black_box(Vec2::new(-1.0, 31.0)),
                black_box(Vec2::new(64.0, 33.0)),
                |hit| {
                    closest = hit.fraction;
                    hit.fraction
                },
            );
            closest
        });
    });

    group.finish();
}

criterion_group!(benches, bench_step, bench_toi, bench_queries);
criterion_main!(benches);
