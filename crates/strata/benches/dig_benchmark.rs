//! Benchmark for digging and job admission.
//!
//! Run with: cargo bench --package strata --bench dig_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata::{ChunkBounds, JobScheduler, TerrainEngine, TerrainJob};
use strata_core::{Axis, ChunkIndex, Direction, TerrainConfig};

fn benchmark_dig_circle(c: &mut Criterion) {
    let mut config = TerrainConfig::default();
    config.surface.base_height = 1000.0;
    let mut engine = TerrainEngine::new(config).unwrap();
    let region = vec![ChunkBounds::new(ChunkIndex::new(-1, -1), ChunkIndex::new(1, 1))];
    engine.update_active_region(&region).unwrap();

    // Already-dug terrain is the steady state; the first pass does the work.
    c.bench_function("dig_circle_r8", |b| {
        let mut step = 0u32;
        b.iter(|| {
            step = step.wrapping_add(1) % 64;
            let origin = [step as f32 - 32.0, (step % 7) as f32 * 3.0 - 10.0];
            let mut mutator = engine.mutator();
            black_box(mutator.dig_circle(origin, 8.0).unwrap());
            black_box(mutator.finish())
        });
    });
}

fn benchmark_admission(c: &mut Criterion) {
    let dims = TerrainConfig::default().dimensions().unwrap();
    let scheduler = JobScheduler::new(dims, 1024);

    c.bench_function("schedule_and_complete", |b| {
        b.iter(|| {
            let job = TerrainJob::DigCircle { origin: [31.0, 31.0], radius: 4.0 };
            black_box(scheduler.schedule(job));
            if let Some(scheduled) = scheduler.take_next() {
                scheduler.complete(&scheduled);
            }
        });
    });
}

fn benchmark_density_line(c: &mut Criterion) {
    let mut config = TerrainConfig::default();
    config.surface.base_height = 1000.0;
    let mut engine = TerrainEngine::new(config).unwrap();
    engine.load_chunk(ChunkIndex::new(0, 0)).unwrap();

    c.bench_function("set_density_line_32", |b| {
        let mut row = 0i32;
        b.iter(|| {
            row = (row + 1) % 32;
            let mut mutator = engine.mutator();
            black_box(mutator.set_density_line(0, row, 31, Axis::X, Direction::Positive, 12))
        });
    });
}

criterion_group!(benches, benchmark_dig_circle, benchmark_admission, benchmark_density_line);
criterion_main!(benches);
