//! # STRATA
//!
//! Voxel terrain engine: chunked density storage, procedural generation,
//! marching-cubes meshing and sub-voxel digging.
//!
//! ## Architecture
//!
//! ```text
//! strata_core        voxels, chunks, store, config, errors
//!     │
//!     ├── strata_procedural   noise, generator, serializers, loader
//!     ├── strata_meshing      marching cubes, greedy quads, mesh sink
//!     │
//! strata             mutator, job scheduler, bounds, TerrainEngine
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata::{ChunkBounds, TerrainEngine};
//! use strata_core::{ChunkIndex, TerrainConfig};
//! use strata_meshing::MeshCollector;
//!
//! let mut engine = TerrainEngine::new(TerrainConfig::load("terrain.toml")?)?;
//! let region = vec![ChunkBounds::new(ChunkIndex::new(-2, -2), ChunkIndex::new(2, 2))];
//! engine.update_active_region(&region)?;
//! engine.dig_circle([3.5, -1.0], 5.0)?;
//!
//! let mut sink = MeshCollector::new();
//! engine.rebuild_dirty_meshes(&mut sink);
//! engine.shutdown()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bounds;
pub mod engine;
pub mod jobs;
pub mod mutator;

pub use bounds::{
    ActorId, ActorPosition, ActorTracker, BodyHandle, BodyPositions, BoundsProvider, ChunkBounds, NoBodies,
    TrackedActor,
};
pub use engine::{EngineStats, RegionUpdate, TerrainEngine};
pub use jobs::{ChunkJobQueue, EnqueueBracket, JobId, JobScheduler, ScheduledJob, SchedulerStats, SyncBarrier, TerrainJob};
pub use mutator::TerrainMutator;
