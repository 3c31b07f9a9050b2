//! # Marching Cubes Surface Extraction
//!
//! Builds a smooth triangle mesh from a chunk's density field.
//!
//! ## Lattice
//!
//! Lattice points sit on voxel centers. Along `z` the chunk's depth layers
//! are framed by one air layer on each side, so every chunk yields a closed
//! slab: lattice `z = 0` and `z = depth + 1` are air, lattice `z = k` samples
//! depth layer `k - 1`. Cells on the `+x`/`+y` border read corners from the
//! neighbor chunk; a neighbor that is not loaded reads as solid.
//!
//! ## Vertex Sharing
//!
//! Every crossed lattice edge yields exactly one vertex per chunk. Vertices
//! are cached by (lattice point, axis) for two `z` layers at a time,
//! addressed by `z & 1`; the sweep is monotonic in `z`, so the layer two
//! steps back is dead and its slots are recycled.

use ndshape::{RuntimeShape, Shape};

use strata_core::chunk::{Chunk, ChunkIndex};
use strata_core::config::MeshingConfig;
use strata_core::store::TerrainStore;
use strata_core::voxel::{DensityLayer, DENSITY_MAX, DENSITY_SOLID, ISOLEVEL};

use crate::mesh::MeshData;
use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_END, TRI_TABLE};
use crate::ChunkMesher;

const NO_VERTEX: u32 = u32::MAX;

/// Lattice position of each edge's lower endpoint and the edge's axis.
const EDGE_ORIGINS: [([usize; 3], usize); 12] = edge_origins();

/// Directions (bit 0 = x, 1 = y, 2 = z) in which an edge is shared with a
/// cell swept earlier.
const EDGE_REUSE: [u8; 12] = edge_reuse();

const fn edge_origins() -> [([usize; 3], usize); 12] {
    let mut out = [([0; 3], 0); 12];
    let mut e = 0;
    while e < 12 {
        let a = CORNER_OFFSETS[EDGE_CORNERS[e][0]];
        let b = CORNER_OFFSETS[EDGE_CORNERS[e][1]];
        let mut origin = [0usize; 3];
        let mut axis = 0;
        let mut k = 0;
        while k < 3 {
            origin[k] = if a[k] < b[k] { a[k] as usize } else { b[k] as usize };
            if a[k] != b[k] {
                axis = k;
            }
            k += 1;
        }
        out[e] = (origin, axis);
        e += 1;
    }
    out
}

const fn edge_reuse() -> [u8; 12] {
    let mut out = [0u8; 12];
    let mut e = 0;
    while e < 12 {
        let (origin, axis) = EDGE_ORIGINS[e];
        let mut k = 0;
        while k < 3 {
            if k != axis && origin[k] == 0 {
                out[e] |= 1 << k;
            }
            k += 1;
        }
        e += 1;
    }
    out
}

/// Marching-cubes parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractorSettings {
    /// Density of the surface.
    pub isolevel: f32,
    /// Which packed density to mesh.
    pub layer: DensityLayer,
    /// Emit normals.
    pub normals: bool,
    /// Emit UVs (world x/y).
    pub uvs: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            isolevel: ISOLEVEL,
            layer: DensityLayer::Foreground,
            normals: true,
            uvs: false,
        }
    }
}

impl From<&MeshingConfig> for ExtractorSettings {
    fn from(config: &MeshingConfig) -> Self {
        Self {
            isolevel: config.isolevel,
            layer: config.layer,
            normals: config.normals,
            uvs: config.uvs,
        }
    }
}

/// Marching-cubes mesher. Keeps its scratch buffers between chunks.
pub struct SurfaceExtractor {
    settings: ExtractorSettings,
    /// Densities over the lattice plus a one-sample apron for gradients.
    field: Vec<f32>,
    /// Two `z` layers of (lattice point, axis) -> vertex index.
    cache: Vec<u32>,
}

impl SurfaceExtractor {
    /// Creates an extractor.
    #[must_use]
    pub fn new(settings: ExtractorSettings) -> Self {
        Self {
            settings,
            field: Vec::new(),
            cache: Vec::new(),
        }
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> ExtractorSettings {
        self.settings
    }

    /// Meshes the chunk at `index`. `None` when it is not loaded.
    pub fn extract(&mut self, store: &TerrainStore, index: ChunkIndex) -> Option<MeshData> {
        let chunk = store.try_get(index)?;
        let mut mesh = MeshData::default();
        self.extract_into(store, chunk, &mut mesh);
        Some(mesh)
    }

    /// Meshes `chunk` into `mesh`, replacing its contents.
    pub fn extract_into(&mut self, store: &TerrainStore, chunk: &Chunk, mesh: &mut MeshData) {
        mesh.clear();
        let dims = chunk.dimensions();
        let (w, h, d) = (dims.width() as usize, dims.height() as usize, dims.depth() as usize);

        // Apron: x and y in -1..=size+1, lattice z in -1..=depth+2.
        let shape = RuntimeShape::<u32, 3>::new([w as u32 + 3, h as u32 + 3, d as u32 + 4]);
        self.fill_field(store, chunk, &shape);

        let slots = (w + 1) * (h + 1) * 2 * 3;
        self.cache.clear();
        self.cache.resize(slots, NO_VERTEX);

        let (origin_x, origin_y) = dims.chunk_origin(chunk.index());
        let iso = self.settings.isolevel;
        let mut corners = [0f32; 8];

        for z in 0..=d {
            self.clear_cache_layer((z + 1) & 1, w, h);
            for y in 0..h {
                for x in 0..w {
                    for (corner, offset) in corners.iter_mut().zip(&CORNER_OFFSETS) {
                        *corner = self.density(&shape, x + offset[0] as usize, y + offset[1] as usize, z + offset[2] as usize);
                    }
                    let case = usize::from(case_code(&corners, iso));
                    if EDGE_TABLE[case] == 0 {
                        continue;
                    }

                    let reuse_mask = u8::from(x > 0) | (u8::from(y > 0) << 1) | (u8::from(z > 0) << 2);
                    let mut edge_vertex = [NO_VERTEX; 12];
                    let row = &TRI_TABLE[case];
                    let mut t = 0;
                    while t < row.len() && row[t] != TRI_END {
                        let mut tri = [0u32; 3];
                        for (slot, &edge) in tri.iter_mut().zip(&row[t..t + 3]) {
                            let edge = edge as usize;
                            if edge_vertex[edge] == NO_VERTEX {
                                edge_vertex[edge] = self.edge_vertex(
                                    &shape,
                                    [x, y, z],
                                    edge,
                                    reuse_mask,
                                    &corners,
                                    (w, h),
                                    (origin_x, origin_y),
                                    mesh,
                                );
                            }
                            *slot = edge_vertex[edge];
                        }
                        // Table winding faces the solid; swap to face the air.
                        mesh.indices.extend_from_slice(&[tri[0], tri[2], tri[1]]);
                        t += 3;
                    }
                }
            }
        }
    }

    fn fill_field(&mut self, store: &TerrainStore, chunk: &Chunk, shape: &RuntimeShape<u32, 3>) {
        let dims = chunk.dimensions();
        let (sx, sy, sz) = (dims.width() + 3, dims.height() + 3, dims.depth() + 4);
        self.field.clear();
        self.field.resize(shape.size() as usize, f32::from(DENSITY_MAX));

        let layer = self.settings.layer;
        let (origin_x, origin_y) = dims.chunk_origin(chunk.index());
        let (w, h) = (dims.width() as i32, dims.height() as i32);

        // Lattice z 1..=depth carries data; the rest stays air.
        for pz in 2..sz - 2 {
            let depth_layer = (pz - 2) as i32;
            for py in 0..sy {
                let y = py as i32 - 1;
                for px in 0..sx {
                    let x = px as i32 - 1;
                    let density = if (0..w).contains(&x) && (0..h).contains(&y) {
                        chunk.voxels()[dims.linear_index(x as u32, y as u32, depth_layer as u32)].density_of(layer)
                    } else {
                        store
                            .voxel_at(origin_x + x, origin_y + y, depth_layer)
                            .map_or(DENSITY_SOLID, |voxel| voxel.density_of(layer))
                    };
                    self.field[shape.linearize([px, py, pz]) as usize] = f32::from(density);
                }
            }
        }
    }

    /// Density at lattice point `(x, y, z)`; all three are apron-shifted by one.
    #[inline]
    fn density(&self, shape: &RuntimeShape<u32, 3>, x: usize, y: usize, z: usize) -> f32 {
        self.field[shape.linearize([x as u32 + 1, y as u32 + 1, z as u32 + 1]) as usize]
    }

    /// Central-difference gradient; points toward increasing density (air).
    fn gradient(&self, shape: &RuntimeShape<u32, 3>, p: [usize; 3]) -> [f32; 3] {
        let sample = |dx: i32, dy: i32, dz: i32| {
            let q = [
                (p[0] as i32 + 1 + dx) as u32,
                (p[1] as i32 + 1 + dy) as u32,
                (p[2] as i32 + 1 + dz) as u32,
            ];
            self.field[shape.linearize(q) as usize]
        };
        [
            (sample(1, 0, 0) - sample(-1, 0, 0)) * 0.5,
            (sample(0, 1, 0) - sample(0, -1, 0)) * 0.5,
            (sample(0, 0, 1) - sample(0, 0, -1)) * 0.5,
        ]
    }

    fn clear_cache_layer(&mut self, parity: usize, w: usize, h: usize) {
        let layer = (w + 1) * (h + 1) * 3;
        self.cache[parity * layer..(parity + 1) * layer].fill(NO_VERTEX);
    }

    #[inline]
    fn cache_slot(point: [usize; 3], axis: usize, (w, h): (usize, usize)) -> usize {
        ((((point[2] & 1) * (h + 1) + point[1]) * (w + 1) + point[0]) * 3) + axis
    }

    #[allow(clippy::too_many_arguments)]
    fn edge_vertex(
        &mut self,
        shape: &RuntimeShape<u32, 3>,
        cell: [usize; 3],
        edge: usize,
        reuse_mask: u8,
        corners: &[f32; 8],
        size: (usize, usize),
        origin: (i32, i32),
        mesh: &mut MeshData,
    ) -> u32 {
        let (offset, axis) = EDGE_ORIGINS[edge];
        let point = [cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2]];
        let slot = Self::cache_slot(point, axis, size);

        if EDGE_REUSE[edge] & reuse_mask != 0 && self.cache[slot] != NO_VERTEX {
            return self.cache[slot];
        }

        let [a, b] = EDGE_CORNERS[edge];
        let mu = interpolation_factor(self.settings.isolevel, corners[a], corners[b]);
        let pa = CORNER_OFFSETS[a];
        let pb = CORNER_OFFSETS[b];
        let lerp = |k: usize| {
            let from = cell[k] as f32 + pa[k] as f32;
            let to = cell[k] as f32 + pb[k] as f32;
            from + mu * (to - from)
        };
        let (lx, ly, lz) = (lerp(0), lerp(1), lerp(2));
        let world_x = origin.0 as f32 + lx;
        let world_y = origin.1 as f32 + ly;

        let vertex = mesh.positions.len() as u32;
        // Lattice z = 1 is depth layer 0.
        mesh.positions.push([world_x, world_y, lz - 1.0]);
        if self.settings.normals {
            let corner = |c: [i32; 3]| [cell[0] + c[0] as usize, cell[1] + c[1] as usize, cell[2] + c[2] as usize];
            let ga = self.gradient(shape, corner(pa));
            let gb = self.gradient(shape, corner(pb));
            mesh.normals.push(normalize([
                ga[0] + mu * (gb[0] - ga[0]),
                ga[1] + mu * (gb[1] - ga[1]),
                ga[2] + mu * (gb[2] - ga[2]),
            ]));
        }
        if self.settings.uvs {
            mesh.uvs.push([world_x, world_y]);
        }

        self.cache[slot] = vertex;
        vertex
    }
}

impl ChunkMesher for SurfaceExtractor {
    fn mesh_chunk(&mut self, store: &TerrainStore, index: ChunkIndex) -> Option<MeshData> {
        self.extract(store, index)
    }
}

/// Position of the surface along an edge from density `a` to density `b`.
///
/// Snaps to an endpoint sitting exactly on the isolevel, and to `a` for a
/// flat edge.
#[must_use]
pub fn interpolation_factor(isolevel: f32, a: f32, b: f32) -> f32 {
    if (isolevel - a).abs() <= f32::EPSILON || (a - b).abs() <= f32::EPSILON {
        0.0
    } else if (isolevel - b).abs() <= f32::EPSILON {
        1.0
    } else {
        ((isolevel - a) / (b - a)).clamp(0.0, 1.0)
    }
}

/// Case code of eight corner densities: bit `i` set when corner `i` is solid.
#[must_use]
pub fn case_code(corners: &[f32; 8], isolevel: f32) -> u8 {
    corners
        .iter()
        .enumerate()
        .filter(|(_, &density)| density < isolevel)
        .fold(0u8, |code, (i, _)| code | (1 << i))
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        [0.0, 0.0, 1.0]
    } else {
        [v[0] / len, v[1] / len, v[2] / len]
    }
}
