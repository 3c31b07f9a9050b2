//! # STRATA Core
//!
//! Shared data model for the terrain engine.
//!
//! ## Core Components
//!
//! - `Voxel`: 4-byte density/material/color sample
//! - `Chunk`: power-of-two block of voxels addressed by a 2D `ChunkIndex`
//! - `TerrainStore`: owns every loaded chunk
//! - `TerrainConfig`: TOML-backed engine settings
//! - `TerrainError`: the error type shared by every STRATA crate
//!
//! ## Density Convention
//!
//! Density `0` is solid, [`DENSITY_MAX`] is air, and the surface lies at
//! [`ISOLEVEL`]. Digging only ever raises density.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod config;
pub mod density;
pub mod error;
pub mod store;
pub mod voxel;

pub use chunk::{Chunk, ChunkDimensions, ChunkIndex, ChunkUsage, ColumnWriter};
pub use config::{
    ChunkConfig, MeshingConfig, MeshingStrategy, NoiseConfig, PersistenceConfig, SurfaceConfig,
    TerrainConfig,
};
pub use density::{segment_densities, surface_row_density, Axis, Direction};
pub use error::{TerrainError, TerrainResult};
pub use store::TerrainStore;
pub use voxel::{
    quantize_density, Color15, DensityLayer, Material, Voxel, DENSITY_MAX, DENSITY_SOLID, ISOLEVEL,
};
