//! # Chunk Seam Tests
//!
//! Meshes of neighboring chunks must meet exactly along their shared border,
//! whichever strategy produced them.

use strata_core::{
    quantize_density, Chunk, ChunkDimensions, ChunkIndex, ChunkUsage, MeshingConfig, MeshingStrategy, Material,
    TerrainStore, Voxel,
};
use strata_meshing::{mesher_for, ChunkMesher, MeshData, SurfaceExtractor};

/// Sloped ground: solid below `y = 3 + 0.3x`, with a soft density ramp.
fn sloped_store(indices: &[ChunkIndex]) -> TerrainStore {
    let dims = ChunkDimensions::new(3, 3, 0).unwrap();
    let mut store = TerrainStore::new(dims);
    for &index in indices {
        let mut chunk = Chunk::new(index, dims, Voxel::AIR, ChunkUsage::RENDERING);
        for y in 0..dims.height() {
            for x in 0..dims.width() {
                let (wx, wy) = dims.local_to_world(index, x, y);
                let surface = 3.0 + 0.3 * wx as f32;
                let density = quantize_density(7.5 + 3.0 * (wy as f32 - surface));
                chunk
                    .set_voxel(i64::from(x), i64::from(y), 0, Voxel::with_density(Material::Dirt, density))
                    .unwrap();
            }
        }
        store.add(index, chunk).unwrap();
    }
    store
}

fn on_plane(mesh: &MeshData, x: f32) -> Vec<[f32; 3]> {
    mesh.positions.iter().copied().filter(|p| (p[0] - x).abs() < 1e-5).collect()
}

fn close(a: [f32; 3], b: [f32; 3]) -> bool {
    (0..3).all(|k| (a[k] - b[k]).abs() < 1e-4)
}

/// Test: both chunks emit the same vertices on the shared `x = 8` plane.
#[test]
fn test_marching_cubes_border_vertices_match() {
    let left = ChunkIndex::new(0, 0);
    let right = ChunkIndex::new(1, 0);
    let store = sloped_store(&[left, right]);

    let mut extractor = SurfaceExtractor::new(Default::default());
    let left_mesh = extractor.extract(&store, left).unwrap();
    let right_mesh = extractor.extract(&store, right).unwrap();
    assert!(!left_mesh.is_empty() && !right_mesh.is_empty());

    let left_border = on_plane(&left_mesh, 8.0);
    let right_border = on_plane(&right_mesh, 8.0);
    assert!(!left_border.is_empty(), "surface must cross the border");
    assert_eq!(left_border.len(), right_border.len(), "same edge crossings on both sides");
    for p in &left_border {
        assert!(right_border.iter().any(|q| close(*p, *q)), "no match for {p:?} in right chunk");
    }
}

/// Test: a border edit only shows up on the neighbor once it is remeshed.
#[test]
fn test_border_edit_changes_neighbor_mesh() {
    let left = ChunkIndex::new(0, 0);
    let right = ChunkIndex::new(1, 0);
    let mut store = sloped_store(&[left, right]);

    let mut extractor = SurfaceExtractor::new(Default::default());
    let before = extractor.extract(&store, left).unwrap();

    // Carve the right chunk's first column; the left chunk's last cell reads it.
    let chunk = store.try_get_mut(right).unwrap();
    for y in 0..8 {
        chunk.raise_column(0, y, 15).unwrap();
    }
    let after = extractor.extract(&store, left).unwrap();
    assert_ne!(on_plane(&before, 8.0).len(), 0);
    assert_ne!(before.positions, after.positions, "left mesh must react to the neighbor edit");
}

/// Test: configuration picks the strategy.
#[test]
fn test_strategy_selection() {
    let index = ChunkIndex::new(0, 0);
    let store = sloped_store(&[index]);

    let blocky = MeshingConfig {
        strategy: MeshingStrategy::Blocky,
        ..MeshingConfig::default()
    };
    let mut mesher = mesher_for(&blocky);
    let mesh = mesher.mesh_chunk(&store, index).unwrap();
    assert!(!mesh.is_empty());
    for n in &mesh.normals {
        let axes = n.iter().filter(|c| c.abs() > 0.5).count();
        assert_eq!(axes, 1, "blocky normals are axis-aligned: {n:?}");
    }

    let mut smooth = mesher_for(&MeshingConfig::default());
    let mesh = smooth.mesh_chunk(&store, index).unwrap();
    assert!(
        mesh.normals.iter().any(|n| n.iter().filter(|c| c.abs() > 1e-3).count() > 1),
        "a slope gives oblique normals"
    );
}

/// Test: unloaded chunks yield no mesh, whatever the strategy.
#[test]
fn test_unloaded_chunk_has_no_mesh() {
    let store = sloped_store(&[ChunkIndex::new(0, 0)]);
    for strategy in [MeshingStrategy::MarchingCubes, MeshingStrategy::Blocky] {
        let config = MeshingConfig {
            strategy,
            ..MeshingConfig::default()
        };
        assert!(mesher_for(&config).mesh_chunk(&store, ChunkIndex::new(5, 5)).is_none());
    }
}
