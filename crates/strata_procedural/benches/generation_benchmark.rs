//! Benchmark for chunk generation and the chunk codec.
//!
//! Run with: cargo bench --package strata_procedural --bench generation_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use strata_core::{ChunkIndex, TerrainConfig};
use strata_procedural::{decode_chunk, encode_chunk, TerrainGenerator};

fn benchmark_single_chunk(c: &mut Criterion) {
    let generator = TerrainGenerator::from_config(&TerrainConfig::default()).unwrap();

    c.bench_function("generate_32x32x4_chunk", |b| {
        let mut y = 0i32;
        b.iter(|| {
            y = y.wrapping_add(1) % 64;
            black_box(generator.generate(ChunkIndex::new(0, y - 32)))
        });
    });
}

fn benchmark_chunk_grid(c: &mut Criterion) {
    let generator = TerrainGenerator::from_config(&TerrainConfig::default()).unwrap();

    let mut group = c.benchmark_group("chunk_grid");
    group.throughput(Throughput::Elements(16 * 16));
    group.sample_size(20);
    group.bench_function("16x16_chunks", |b| {
        b.iter(|| {
            for y in -8..8 {
                for x in -8..8 {
                    black_box(generator.generate(ChunkIndex::new(x, y)));
                }
            }
        });
    });
    group.finish();
}

fn benchmark_codec(c: &mut Criterion) {
    let generator = TerrainGenerator::from_config(&TerrainConfig::default()).unwrap();
    let index = ChunkIndex::new(3, -1);
    let chunk = generator.generate(index);
    let bytes = encode_chunk(&chunk);

    c.bench_function("encode_chunk", |b| b.iter(|| black_box(encode_chunk(black_box(&chunk)))));
    c.bench_function("decode_chunk", |b| {
        b.iter(|| black_box(decode_chunk(index, black_box(&bytes)).unwrap()));
    });
}

criterion_group!(benches, benchmark_single_chunk, benchmark_chunk_grid, benchmark_codec);
criterion_main!(benches);
