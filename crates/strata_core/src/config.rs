//! # Terrain Configuration
//!
//! Engine settings loaded once at startup from TOML.
//!
//! ```toml
//! [chunk]
//! log_width = 5
//! log_height = 5
//! log_depth = 2
//! usage = "both"
//!
//! [noise]
//! seed = 42
//! octaves = 3
//! base_frequency = 0.1
//! persistence = 0.5
//!
//! [meshing]
//! strategy = "marching_cubes"
//! ```
//!
//! Every section and field is optional and falls back to [`Default`].
//! Unknown enum variants and out-of-range values are rejected with
//! [`TerrainError::Configuration`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkDimensions, ChunkUsage};
use crate::error::{TerrainError, TerrainResult};
use crate::voxel::{DensityLayer, Material, DENSITY_MAX, ISOLEVEL};

/// Largest supported octave count.
pub const MAX_OCTAVES: u32 = 16;

/// Chunk geometry and usage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkConfig {
    /// log2 of chunk width in voxels.
    pub log_width: u32,
    /// log2 of chunk height in voxels.
    pub log_height: u32,
    /// log2 of chunk depth in voxels.
    pub log_depth: u32,
    /// Derived products new chunks need.
    pub usage: ChunkUsage,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            log_width: 5,
            log_height: 5,
            log_depth: 2,
            usage: ChunkUsage::BOTH,
        }
    }
}

/// Multi-octave noise parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    /// World seed.
    pub seed: u64,
    /// Number of octaves.
    pub octaves: u32,
    /// Frequency of octave 0.
    pub base_frequency: f64,
    /// Amplitude falloff per octave.
    pub persistence: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            octaves: 3,
            base_frequency: 0.1,
            persistence: 0.5,
        }
    }
}

/// Height-field shaping and materials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfaceConfig {
    /// Multiplier applied to the noise value.
    pub amplitude: f64,
    /// World Y the surface oscillates around.
    pub base_height: f64,
    /// Material just below the surface.
    pub fill_material: Material,
    /// Material deeper than `rock_depth` below the surface.
    pub rock_material: Material,
    /// Voxels of fill material before rock begins.
    pub rock_depth: u32,
    /// Height rows kept in the per-column cache.
    pub height_cache_columns: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            amplitude: 12.0,
            base_height: 0.0,
            fill_material: Material::Dirt,
            rock_material: Material::Rock,
            rock_depth: 8,
            height_cache_columns: 256,
        }
    }
}

/// Surface extraction algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshingStrategy {
    /// Smooth isosurface with sub-voxel vertex placement.
    #[default]
    MarchingCubes,
    /// Axis-aligned greedy quads over solid voxels.
    Blocky,
}

/// Surface extraction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshingConfig {
    /// Algorithm.
    pub strategy: MeshingStrategy,
    /// Density threshold of the surface.
    pub isolevel: f32,
    /// Which packed density to mesh.
    pub layer: DensityLayer,
    /// Emit per-vertex normals.
    pub normals: bool,
    /// Emit per-vertex UVs.
    pub uvs: bool,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            strategy: MeshingStrategy::MarchingCubes,
            isolevel: ISOLEVEL,
            layer: DensityLayer::Foreground,
            normals: true,
            uvs: false,
        }
    }
}

/// Chunk persistence parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Background writer threads.
    pub workers: usize,
    /// Pending writes before `try_serialize` blocks.
    pub queue_capacity: usize,
    /// Directory for chunk files; in-memory storage when absent.
    pub directory: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            directory: None,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerrainConfig {
    /// Chunk geometry.
    pub chunk: ChunkConfig,
    /// Noise parameters.
    pub noise: NoiseConfig,
    /// Surface shaping.
    pub surface: SurfaceConfig,
    /// Surface extraction.
    pub meshing: MeshingConfig,
    /// Persistence.
    pub persistence: PersistenceConfig,
}

impl TerrainConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` on syntax errors, unknown variants or values
    /// rejected by [`TerrainConfig::validate`].
    pub fn from_toml_str(source: &str) -> TerrainResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| TerrainError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> TerrainResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TerrainError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a value cannot be represented.
    pub fn to_toml_string(&self) -> TerrainResult<String> {
        toml::to_string(self).map_err(|e| TerrainError::Configuration(e.to_string()))
    }

    /// Chunk dimensions described by the `[chunk]` section.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for unsupported extents.
    pub fn dimensions(&self) -> TerrainResult<ChunkDimensions> {
        ChunkDimensions::new(self.chunk.log_width, self.chunk.log_height, self.chunk.log_depth)
    }

    /// Checks every section for unsupported values.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` describing the first problem found.
    pub fn validate(&self) -> TerrainResult<()> {
        self.dimensions()?;

        let noise = &self.noise;
        if !(1..=MAX_OCTAVES).contains(&noise.octaves) {
            return Err(invalid(format!(
                "noise.octaves must be in 1..={MAX_OCTAVES}, got {}",
                noise.octaves
            )));
        }
        if !(noise.base_frequency.is_finite() && noise.base_frequency > 0.0) {
            return Err(invalid(format!(
                "noise.base_frequency must be positive, got {}",
                noise.base_frequency
            )));
        }
        if !(noise.persistence.is_finite() && noise.persistence > 0.0) {
            return Err(invalid(format!(
                "noise.persistence must be positive, got {}",
                noise.persistence
            )));
        }

        let surface = &self.surface;
        if !surface.amplitude.is_finite() || !surface.base_height.is_finite() {
            return Err(invalid("surface.amplitude and surface.base_height must be finite".into()));
        }
        if !surface.fill_material.is_solid() || !surface.rock_material.is_solid() {
            return Err(invalid("surface materials must be solid, not air".into()));
        }
        if surface.height_cache_columns == 0 {
            return Err(invalid("surface.height_cache_columns must be at least 1".into()));
        }

        let isolevel = self.meshing.isolevel;
        if !(isolevel > 0.0 && isolevel < f32::from(DENSITY_MAX)) {
            return Err(invalid(format!(
                "meshing.isolevel must be strictly between 0 and {DENSITY_MAX}, got {isolevel}"
            )));
        }

        if self.persistence.workers == 0 {
            return Err(invalid("persistence.workers must be at least 1".into()));
        }
        if self.persistence.queue_capacity == 0 {
            return Err(invalid("persistence.queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> TerrainError {
    TerrainError::Configuration(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TerrainConfig::default();
        config.validate().expect("default configuration must be playable");
        let dims = config.dimensions().unwrap();
        assert_eq!((dims.width(), dims.height(), dims.depth()), (32, 32, 4));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = TerrainConfig::from_toml_str(
            r#"
            [noise]
            seed = 7

            [meshing]
            strategy = "blocky"
            layer = "background"
            "#,
        )
        .unwrap();
        assert_eq!(config.noise.seed, 7);
        assert_eq!(config.noise.octaves, 3);
        assert_eq!(config.meshing.strategy, MeshingStrategy::Blocky);
        assert_eq!(config.meshing.layer, DensityLayer::Background);
        assert_eq!(config.chunk.usage, ChunkUsage::BOTH);
    }

    #[test]
    fn test_unknown_variant_is_configuration_error() {
        let err = TerrainConfig::from_toml_str("[meshing]\nstrategy = \"dual_contouring\"\n").unwrap_err();
        assert!(matches!(err, TerrainError::Configuration(_)), "got {err:?}");

        let err = TerrainConfig::from_toml_str("[chunk]\nusage = \"audio\"\n").unwrap_err();
        assert!(matches!(err, TerrainError::Configuration(_)));
    }

    #[test]
    fn test_air_fill_rejected() {
        let err = TerrainConfig::from_toml_str("[surface]\nfill_material = \"air\"\n").unwrap_err();
        assert!(err.to_string().contains("solid"), "{err}");
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for doc in [
            "[chunk]\nlog_width = 0\n",
            "[noise]\noctaves = 0\n",
            "[noise]\nbase_frequency = -1.0\n",
            "[meshing]\nisolevel = 15.0\n",
            "[persistence]\nworkers = 0\n",
        ] {
            assert!(TerrainConfig::from_toml_str(doc).is_err(), "accepted: {doc}");
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = TerrainConfig::default();
        config.chunk.usage = ChunkUsage::PHYSICS;
        config.persistence.directory = Some(PathBuf::from("chunks"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(TerrainConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("strata_missing_config_does_not_exist.toml");
        assert!(matches!(TerrainConfig::load(path), Err(TerrainError::Configuration(_))));
    }
}
