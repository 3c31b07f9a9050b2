//! # Terrain Engine Tests
//!
//! End-to-end runs: stream a region, edit it from several threads, mesh it
//! and check the results are reproducible.

use std::sync::Arc;
use std::thread;

use strata::{ActorId, ActorPosition, ActorTracker, ChunkBounds, TerrainEngine, TerrainJob, TrackedActor};
use strata_core::{ChunkIndex, MeshingStrategy, TerrainConfig, DENSITY_MAX, DENSITY_SOLID};
use strata_meshing::MeshCollector;

fn small_config() -> TerrainConfig {
    TerrainConfig::from_toml_str(
        r#"
        [chunk]
        log_width = 4
        log_height = 4
        log_depth = 1

        [noise]
        seed = 7

        [persistence]
        workers = 2
        "#,
    )
    .unwrap()
}

fn region(radius: i32) -> Vec<ChunkBounds> {
    vec![ChunkBounds::new(ChunkIndex::new(-radius, -radius), ChunkIndex::new(radius, radius))]
}

/// Test: the dig scenario on a fully solid 32x32 chunk.
#[test]
fn test_dig_circle_on_solid_chunk() {
    let mut config = TerrainConfig::default();
    config.surface.amplitude = 0.0;
    config.surface.base_height = 1000.0;
    let mut engine = TerrainEngine::new(config).unwrap();
    engine.load_chunk(ChunkIndex::new(0, 0)).unwrap();

    let affected = engine.dig_circle([0.0, 0.0], 5.0).unwrap();
    assert_eq!(affected, vec![ChunkIndex::new(0, 0)]);

    let density = |x, y| engine.store().voxel_at(x, y, 0).unwrap().foreground();
    assert_eq!(density(0, 0), DENSITY_MAX);
    assert_eq!(density(20, 20), DENSITY_SOLID);
    let boundary = [density(3, 4), density(2, 5), density(1, 5), density(5, 1)];
    assert!(
        boundary.iter().all(|&d| d > DENSITY_SOLID && d < DENSITY_MAX),
        "boundary keeps fractional densities: {boundary:?}"
    );
}

/// Test: producers on other threads schedule, the owner thread applies.
#[test]
fn test_concurrent_producers() {
    let mut engine = TerrainEngine::new(small_config()).unwrap();
    engine.update_active_region(&region(2)).unwrap();
    let scheduler = engine.scheduler();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                (0..10)
                    .filter(|i| {
                        let origin = [(p * 10 + i) as f32 - 20.0, -4.0];
                        scheduler.schedule(TerrainJob::DigCircle { origin, radius: 2.5 }).is_some()
                    })
                    .count() as u64
            })
        })
        .collect();

    let mut before = Vec::new();
    for x in -32..32 {
        before.push(engine.store().voxel_at(x, -4, 0).unwrap().foreground());
    }

    let mut admitted = 0;
    for producer in producers {
        admitted += producer.join().unwrap();
        engine.run_pending_jobs().unwrap();
    }
    engine.run_pending_jobs().unwrap();

    let stats = engine.stats();
    assert_eq!(stats.jobs_admitted, admitted);
    assert_eq!(stats.jobs_admitted + stats.jobs_skipped, 40);
    assert_eq!(stats.jobs_completed, admitted);
    assert!(admitted > 0);

    for (i, x) in (-32..32).enumerate() {
        let now = engine.store().voxel_at(x, -4, 0).unwrap().foreground();
        assert!(now >= before[i], "density dropped at x = {x}");
    }
    // Every reservation was released.
    for index in engine.store().indices() {
        assert_eq!(scheduler.chunk_queue(index).pending(), 0, "chunk {index}");
    }
}

/// Test: an actor walking east streams chunks in and out.
#[test]
fn test_actor_walk_streams_chunks() {
    let mut engine = TerrainEngine::new(small_config()).unwrap();
    let mut tracker = ActorTracker::new(engine.dimensions());
    tracker.track(
        ActorId(1),
        TrackedActor {
            position: ActorPosition::Local { x: 0.0, y: 0.0 },
            view_radius: 1,
        },
    );
    let mut sink = MeshCollector::new();

    for step in 0..8 {
        let x = step as f32 * 16.0;
        tracker.set_local_position(ActorId(1), x, 0.0);
        engine.update_active_region(&tracker).unwrap();
        engine.rebuild_dirty_meshes(&mut sink);
        assert_eq!(engine.store().len(), 9, "step {step}");
    }

    let stats = engine.stats();
    assert_eq!(stats.chunks_generated, 9 + 7 * 3);
    assert_eq!(stats.chunks_unloaded, 7 * 3);
    // The sink only holds meshes of loaded chunks.
    for index in engine.meshed_chunks() {
        assert!(engine.store().contains(index));
        assert!(sink.get(index).is_some());
    }
    assert_eq!(sink.len(), engine.meshed_chunks().len());
    engine.shutdown().unwrap();
}

/// Test: same configuration and edits, same bytes and same meshes.
#[test]
fn test_reproducible_worlds() {
    let run = || {
        let mut engine = TerrainEngine::new(small_config()).unwrap();
        engine.update_active_region(&region(1)).unwrap();
        engine.dig_circle([3.25, -2.5], 6.0).unwrap();
        engine.dig_circle([-9.0, 1.0], 3.5).unwrap();
        let mut sink = MeshCollector::new();
        engine.rebuild_dirty_meshes(&mut sink);
        let bytes: Vec<Vec<u8>> = engine
            .store()
            .indices()
            .into_iter()
            .map(|index| engine.store().try_get(index).unwrap().as_bytes().to_vec())
            .collect();
        let mesh = sink.get(ChunkIndex::new(0, -1)).cloned();
        (bytes, mesh)
    };
    let (bytes_a, mesh_a) = run();
    let (bytes_b, mesh_b) = run();
    assert_eq!(bytes_a, bytes_b);
    assert_eq!(mesh_a, mesh_b);
}

/// Test: the blocky strategy drives meshing when configured.
#[test]
fn test_blocky_engine() {
    let mut config = small_config();
    config.meshing.strategy = MeshingStrategy::Blocky;
    // Keep the surface inside chunk (0, 0).
    config.surface.amplitude = 2.0;
    config.surface.base_height = 8.0;
    let mut engine = TerrainEngine::new(config).unwrap();
    engine.update_active_region(&region(0)).unwrap();

    let mut sink = MeshCollector::new();
    assert_eq!(engine.rebuild_dirty_meshes(&mut sink), 1);
    let mesh = sink.get(ChunkIndex::new(0, 0)).unwrap();
    assert_eq!(mesh.vertex_count() % 4, 0, "greedy quads have four vertices each");
}
