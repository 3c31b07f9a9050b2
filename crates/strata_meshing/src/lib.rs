//! # STRATA Meshing
//!
//! Turns terrain chunks into triangle meshes.
//!
//! ## Strategies
//!
//! - [`SurfaceExtractor`]: marching cubes over the density field. Vertices on
//!   shared cell edges are emitted once and reused, and chunk borders sample
//!   the neighbor chunk so adjacent meshes meet without seams.
//! - [`BlockyMesher`]: greedy quads over voxels classified solid or empty.
//!
//! Both implement [`ChunkMesher`]; [`mesher_for`] picks one from the
//! `[meshing]` configuration section.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_meshing::{mesher_for, MeshCollector, MeshSink};
//!
//! let mut mesher = mesher_for(&config.meshing);
//! if let Some(mesh) = mesher.mesh_chunk(&store, index) {
//!     sink.set_mesh(index, mesh);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod blocky;
pub mod marching_cubes;
pub mod mesh;
pub mod tables;

pub use blocky::{BlockVoxel, BlockyMesher};
pub use marching_cubes::{case_code, interpolation_factor, ExtractorSettings, SurfaceExtractor};
pub use mesh::{MeshCollector, MeshData, MeshSink};

use strata_core::chunk::ChunkIndex;
use strata_core::config::{MeshingConfig, MeshingStrategy};
use strata_core::store::TerrainStore;

/// A meshing strategy.
///
/// Implementations keep scratch buffers between calls, hence `&mut self`.
pub trait ChunkMesher {
    /// Meshes the chunk at `index`.
    ///
    /// Returns `None` when the chunk is not loaded. An empty mesh means the
    /// chunk is loaded but has no surface.
    fn mesh_chunk(&mut self, store: &TerrainStore, index: ChunkIndex) -> Option<MeshData>;
}

/// Builds the mesher selected by `config.strategy`.
#[must_use]
pub fn mesher_for(config: &MeshingConfig) -> Box<dyn ChunkMesher + Send> {
    tracing::debug!(strategy = ?config.strategy, isolevel = config.isolevel, "Creating mesher");
    match config.strategy {
        MeshingStrategy::MarchingCubes => Box::new(SurfaceExtractor::new(ExtractorSettings::from(config))),
        MeshingStrategy::Blocky => Box::new(BlockyMesher::from_config(config)),
    }
}
