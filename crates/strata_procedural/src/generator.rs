//! # Terrain Generator
//!
//! Turns a 1D noise height field into chunk voxels.
//!
//! ## Layout
//!
//! For every world column `x` the surface height is
//! `noise(x) * amplitude + base_height`. Rows above `floor(height)` are air,
//! the row at `floor(height)` carries a partial density that places the
//! surface at its exact fractional height, and rows below are solid.
//!
//! Height rows are cached per chunk column so chunks stacked vertically
//! reuse the same row and agree on the surface at their shared border.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use strata_core::chunk::{Chunk, ChunkDimensions, ChunkIndex, ChunkUsage, ColumnWriter};
use strata_core::config::{SurfaceConfig, TerrainConfig};
use strata_core::density::surface_row_density;
use strata_core::error::TerrainResult;
use strata_core::voxel::{Material, Voxel};

use crate::noise::{NoiseGenerator, NoiseParams};

/// Deterministic chunk synthesizer.
pub struct TerrainGenerator {
    noise: NoiseGenerator,
    dims: ChunkDimensions,
    usage: ChunkUsage,
    surface: SurfaceConfig,
    /// Chunk column x -> surface height per local x.
    heights: Mutex<HashMap<i32, Arc<[f64]>>>,
}

impl TerrainGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new(noise: NoiseGenerator, dims: ChunkDimensions, usage: ChunkUsage, surface: SurfaceConfig) -> Self {
        Self {
            noise,
            dims,
            usage,
            surface,
            heights: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a generator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid chunk or noise settings.
    pub fn from_config(config: &TerrainConfig) -> TerrainResult<Self> {
        let noise = NoiseGenerator::new(NoiseParams::from(&config.noise))?;
        Ok(Self::new(noise, config.dimensions()?, config.chunk.usage, config.surface.clone()))
    }

    /// Chunk extents produced by this generator.
    #[inline]
    #[must_use]
    pub const fn dimensions(&self) -> ChunkDimensions {
        self.dims
    }

    /// The noise source.
    #[inline]
    #[must_use]
    pub fn noise(&self) -> &NoiseGenerator {
        &self.noise
    }

    /// Surface heights for every world x in chunk column `column_x`.
    ///
    /// Index `i` of the result is world x `column_x * width + i`.
    #[must_use]
    pub fn surface_heights(&self, column_x: i32) -> Arc<[f64]> {
        if let Some(row) = self.heights.lock().get(&column_x) {
            return Arc::clone(row);
        }

        let (origin_x, _) = self.dims.chunk_origin(ChunkIndex::new(column_x, 0));
        let row: Arc<[f64]> = (0..self.dims.width() as i32)
            .map(|x| {
                let world_x = f64::from(origin_x + x);
                self.noise.generate_1d(world_x) * self.surface.amplitude + self.surface.base_height
            })
            .collect();

        let mut heights = self.heights.lock();
        if heights.len() >= self.surface.height_cache_columns {
            heights.clear();
        }
        Arc::clone(heights.entry(column_x).or_insert(row))
    }

    /// Number of height rows currently cached.
    #[must_use]
    pub fn cached_columns(&self) -> usize {
        self.heights.lock().len()
    }

    /// Generates the chunk at `index`.
    #[must_use]
    pub fn generate(&self, index: ChunkIndex) -> Chunk {
        let mut chunk = Chunk::new(index, self.dims, Voxel::AIR, self.usage);
        self.fill_chunk(&mut chunk);
        chunk
    }

    /// Overwrites every voxel of `chunk` with generated terrain.
    pub fn fill_chunk(&self, chunk: &mut Chunk) {
        let index = chunk.index();
        let heights = self.surface_heights(index.x);
        let (_, origin_y) = self.dims.chunk_origin(index);
        let mut writer = ColumnWriter::new(chunk);

        for (x, &height) in heights.iter().enumerate() {
            let surface_row = height.floor();
            let fraction = (height - surface_row) as f32;
            for y in 0..self.dims.height() {
                let world_y = f64::from(origin_y + y as i32);
                let voxel = if world_y > surface_row {
                    Voxel::AIR
                } else if world_y == surface_row {
                    Voxel::with_density(self.surface.fill_material, surface_row_density(fraction))
                } else {
                    Voxel::solid(self.material_at_depth(surface_row - world_y))
                };
                writer.fill(x as u32, y, voxel);
            }
        }
        trace!("Generated chunk {}", index);
    }

    fn material_at_depth(&self, depth: f64) -> Material {
        if depth > f64::from(self.surface.rock_depth) {
            self.surface.rock_material
        } else {
            self.surface.fill_material
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::voxel::{DENSITY_MAX, DENSITY_SOLID};

    fn generator(surface: SurfaceConfig) -> TerrainGenerator {
        let noise = NoiseGenerator::new(NoiseParams {
            seed: 42,
            octaves: 3,
            base_frequency: 0.1,
            persistence: 0.5,
        })
        .unwrap();
        TerrainGenerator::new(noise, ChunkDimensions::new(4, 4, 1).unwrap(), ChunkUsage::BOTH, surface)
    }

    #[test]
    fn test_generation_is_byte_identical() {
        let a = generator(SurfaceConfig::default());
        let b = generator(SurfaceConfig::default());
        for index in [ChunkIndex::new(0, 0), ChunkIndex::new(-3, -1), ChunkIndex::new(7, 2)] {
            assert_eq!(a.generate(index).as_bytes(), b.generate(index).as_bytes(), "chunk {index}");
        }
    }

    #[test]
    fn test_column_layout() {
        let generator = generator(SurfaceConfig {
            amplitude: 6.0,
            base_height: 4.0,
            ..SurfaceConfig::default()
        });
        let dims = generator.dimensions();
        for index in [ChunkIndex::new(0, 0), ChunkIndex::new(0, -1), ChunkIndex::new(2, 0)] {
            let chunk = generator.generate(index);
            let heights = generator.surface_heights(index.x);
            let (_, origin_y) = dims.chunk_origin(index);
            for x in 0..dims.width() {
                let surface_row = heights[x as usize].floor();
                for y in 0..dims.height() {
                    let world_y = f64::from(origin_y + y as i32);
                    let voxel = chunk.voxel(i64::from(x), i64::from(y), 1).unwrap();
                    if world_y > surface_row {
                        assert_eq!(voxel, Voxel::AIR);
                    } else if world_y < surface_row {
                        assert_eq!(voxel.foreground(), DENSITY_SOLID);
                    } else {
                        assert_eq!(voxel.foreground(), voxel.background(), "both layers get the surface");
                        assert!(voxel.foreground() < DENSITY_MAX);
                    }
                }
            }
        }
    }

    #[test]
    fn test_surface_row_tracks_fraction() {
        let row = |base_height: f64| {
            let generator = generator(SurfaceConfig {
                amplitude: 0.0,
                base_height,
                ..SurfaceConfig::default()
            });
            generator.generate(ChunkIndex::new(0, 0)).voxel(0, 8, 0).unwrap().foreground()
        };
        // Surface on the row: that row sits at the isolevel.
        assert_eq!(row(8.0), 8);
        // Heights in the upper half of the voxel still place the surface.
        assert!(row(8.25) > row(8.6));
        assert!(row(8.6) > row(8.9));
        assert_ne!(row(8.9), DENSITY_SOLID);

        let chunk = |base_height: f64| {
            generator(SurfaceConfig {
                amplitude: 0.0,
                base_height,
                ..SurfaceConfig::default()
            })
            .generate(ChunkIndex::new(0, 0))
        };
        assert_ne!(chunk(8.6).as_bytes(), chunk(8.9).as_bytes());
    }

    #[test]
    fn test_rock_below_fill() {
        let generator = generator(SurfaceConfig {
            amplitude: 0.0,
            base_height: 15.0,
            rock_depth: 3,
            ..SurfaceConfig::default()
        });
        let chunk = generator.generate(ChunkIndex::new(0, 0));
        let material = |y: i64| chunk.voxel(0, y, 0).unwrap().material();
        assert_eq!(material(15), Some(Material::Dirt));
        assert_eq!(material(12), Some(Material::Dirt));
        assert_eq!(material(11), Some(Material::Rock));
    }

    #[test]
    fn test_height_rows_shared_and_bounded() {
        let generator = generator(SurfaceConfig {
            height_cache_columns: 2,
            ..SurfaceConfig::default()
        });
        let first = generator.surface_heights(5);
        let again = generator.surface_heights(5);
        assert!(Arc::ptr_eq(&first, &again), "row is reused for stacked chunks");

        let _ = generator.surface_heights(6);
        let _ = generator.surface_heights(7);
        assert!(generator.cached_columns() <= 2);
        assert_eq!(&generator.surface_heights(5)[..], &first[..], "evicted rows regenerate identically");
    }
}
