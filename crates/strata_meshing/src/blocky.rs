//! Blocky Mesher - greedy quads over solid voxels using block-mesh-rs
//!
//! Each voxel is either fully solid or empty at the configured isolevel, so
//! sub-voxel density is ignored. Faces between equal materials merge into
//! larger quads; UVs tile once per voxel across a merged quad.
//!
//! The padded buffer is one voxel larger than the chunk on every side. The
//! `x`/`y` apron comes from neighbor chunks (unloaded neighbors are solid),
//! the `z` apron is always air.

use block_mesh::{
    greedy_quads, GreedyQuadsBuffer, MergeVoxel, Voxel as BlockMeshVoxel, VoxelVisibility,
    RIGHT_HANDED_Y_UP_CONFIG,
};
use ndshape::{RuntimeShape, Shape};

use strata_core::chunk::{Chunk, ChunkIndex};
use strata_core::config::MeshingConfig;
use strata_core::store::TerrainStore;
use strata_core::voxel::{DensityLayer, Material, Voxel, ISOLEVEL};

use crate::mesh::MeshData;
use crate::ChunkMesher;

/// Voxel as seen by the greedy mesher.
///
/// Only same-material faces merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockVoxel {
    /// Material ID, `0` for empty.
    pub material_id: u8,
}

impl BlockVoxel {
    /// Empty cell.
    pub const EMPTY: Self = Self { material_id: 0 };

    /// Classifies a terrain voxel against `isolevel` in `layer`.
    #[must_use]
    pub fn classify(voxel: Voxel, layer: DensityLayer, isolevel: f32) -> Self {
        if f32::from(voxel.density_of(layer)) < isolevel {
            // Unknown material bytes still render, as dirt.
            let material = voxel.material().filter(|m| m.is_solid()).unwrap_or(Material::Dirt);
            Self { material_id: material as u8 }
        } else {
            Self::EMPTY
        }
    }
}

impl BlockMeshVoxel for BlockVoxel {
    fn get_visibility(&self) -> VoxelVisibility {
        if self.material_id == 0 {
            VoxelVisibility::Empty
        } else {
            VoxelVisibility::Opaque
        }
    }
}

impl MergeVoxel for BlockVoxel {
    type MergeValue = u8;

    fn merge_value(&self) -> Self::MergeValue {
        self.material_id
    }
}

/// Greedy quad mesher.
pub struct BlockyMesher {
    layer: DensityLayer,
    isolevel: f32,
    uvs: bool,
    normals: bool,
    voxels: Vec<BlockVoxel>,
    buffer: GreedyQuadsBuffer,
}

impl BlockyMesher {
    /// Creates a mesher.
    #[must_use]
    pub fn new(layer: DensityLayer, isolevel: f32, normals: bool, uvs: bool) -> Self {
        Self {
            layer,
            isolevel,
            uvs,
            normals,
            voxels: Vec::new(),
            buffer: GreedyQuadsBuffer::new(0),
        }
    }

    /// Creates a mesher from the `[meshing]` section.
    #[must_use]
    pub fn from_config(config: &MeshingConfig) -> Self {
        Self::new(config.layer, config.isolevel, config.normals, config.uvs)
    }

    /// Quads produced by the last call.
    #[must_use]
    pub fn last_quad_count(&self) -> usize {
        self.buffer.quads.num_quads()
    }

    /// Meshes `chunk`, reading its border from `store`.
    pub fn mesh(&mut self, store: &TerrainStore, chunk: &Chunk) -> MeshData {
        let dims = chunk.dimensions();
        let (w, h, d) = (dims.width(), dims.height(), dims.depth());
        let shape = RuntimeShape::<u32, 3>::new([w + 2, h + 2, d + 2]);
        let volume = shape.size() as usize;

        self.voxels.clear();
        self.voxels.resize(volume, BlockVoxel::EMPTY);
        let (origin_x, origin_y) = dims.chunk_origin(chunk.index());

        for pz in 1..=d {
            let layer_z = pz - 1;
            for py in 0..h + 2 {
                let y = py as i32 - 1;
                for px in 0..w + 2 {
                    let x = px as i32 - 1;
                    let voxel = if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                        Some(chunk.voxels()[dims.linear_index(x as u32, y as u32, layer_z)])
                    } else {
                        store.voxel_at(origin_x + x, origin_y + y, layer_z as i32)
                    };
                    let block = voxel.map_or(BlockVoxel { material_id: Material::Rock as u8 }, |v| {
                        BlockVoxel::classify(v, self.layer, self.isolevel)
                    });
                    self.voxels[shape.linearize([px, py, pz]) as usize] = block;
                }
            }
        }

        self.buffer.reset(volume);
        greedy_quads(
            &self.voxels,
            &shape,
            [0; 3],
            [w + 1, h + 1, d + 1],
            &RIGHT_HANDED_Y_UP_CONFIG.faces,
            &mut self.buffer,
        );

        let mut mesh = MeshData::default();
        for (group, face) in self.buffer.quads.groups.iter().zip(RIGHT_HANDED_Y_UP_CONFIG.faces.iter()) {
            let normal = face.signed_normal();
            let normal = [normal.x as f32, normal.y as f32, normal.z as f32];
            for quad in group {
                let base = mesh.positions.len() as u32;
                // Padding shifts every coordinate by one.
                for position in face.quad_mesh_positions(quad, 1.0) {
                    mesh.positions.push([
                        position[0] - 1.0 + origin_x as f32,
                        position[1] - 1.0 + origin_y as f32,
                        position[2] - 1.0,
                    ]);
                }
                if self.normals {
                    mesh.normals.extend_from_slice(&[normal; 4]);
                }
                if self.uvs {
                    let (qw, qh) = (quad.width as f32, quad.height as f32);
                    mesh.uvs.extend_from_slice(&[[0.0, 0.0], [qw, 0.0], [0.0, qh], [qw, qh]]);
                }
                mesh.indices.extend_from_slice(&face.quad_mesh_indices(base));
            }
        }
        mesh
    }
}

impl Default for BlockyMesher {
    fn default() -> Self {
        Self::new(DensityLayer::Foreground, ISOLEVEL, true, false)
    }
}

impl ChunkMesher for BlockyMesher {
    fn mesh_chunk(&mut self, store: &TerrainStore, index: ChunkIndex) -> Option<MeshData> {
        let chunk = store.try_get(index)?;
        Some(self.mesh(store, chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::chunk::{ChunkDimensions, ChunkUsage};

    fn store_with(fill: Voxel) -> TerrainStore {
        let dims = ChunkDimensions::new(3, 3, 0).unwrap();
        let mut store = TerrainStore::new(dims);
        let index = ChunkIndex::new(0, 0);
        store.add(index, Chunk::new(index, dims, fill, ChunkUsage::RENDERING)).unwrap();
        store
    }

    #[test]
    fn test_single_voxel_is_a_cube() {
        let mut store = store_with(Voxel::AIR);
        let chunk = store.try_get_mut(ChunkIndex::new(0, 0)).unwrap();
        chunk.set_voxel(4, 4, 0, Voxel::solid(Material::Sand)).unwrap();

        let mut mesher = BlockyMesher::default();
        let mesh = mesher.mesh_chunk(&store, ChunkIndex::new(0, 0)).unwrap();
        // The apron only decides visibility; it never gets faces of its own.
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.normals.len(), mesh.vertex_count());
        for p in &mesh.positions {
            assert!((4.0..=5.0).contains(&p[0]) && (4.0..=5.0).contains(&p[1]) && (0.0..=1.0).contains(&p[2]));
        }
    }

    #[test]
    fn test_solid_slab_merges_caps() {
        let store = store_with(Voxel::solid(Material::Dirt));
        let mut mesher = BlockyMesher::default();
        let mesh = mesher.mesh_chunk(&store, ChunkIndex::new(0, 0)).unwrap();
        // Front and back caps, one quad each; sides are hidden by solid neighbors.
        assert_eq!(mesher.last_quad_count(), 2);
        assert_eq!(mesh.triangle_count(), 4);
    }

    #[test]
    fn test_classify() {
        assert_eq!(BlockVoxel::classify(Voxel::AIR, DensityLayer::Foreground, ISOLEVEL), BlockVoxel::EMPTY);
        let mut dug = Voxel::solid(Material::Clay);
        dug.set_foreground(15);
        assert_eq!(BlockVoxel::classify(dug, DensityLayer::Foreground, ISOLEVEL), BlockVoxel::EMPTY);
        assert_eq!(
            BlockVoxel::classify(dug, DensityLayer::Background, ISOLEVEL).material_id,
            Material::Clay as u8
        );
    }
}
