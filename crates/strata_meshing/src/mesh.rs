//! Mesh output and the consumer contract.

use std::collections::HashMap;

use strata_core::chunk::ChunkIndex;

/// Triangle mesh for one chunk.
///
/// `normals` and `uvs` are either empty or parallel to `positions`.
/// Indices come in triples with counter-clockwise winding seen from the air
/// side of the surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Vertex positions in world space.
    pub positions: Vec<[f32; 3]>,
    /// Unit normals pointing out of the solid.
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinates.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// True when the mesh has no triangles.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates over triangles as index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Unnormalized geometric normal of a triangle, from its winding.
    #[must_use]
    pub fn face_normal(&self, triangle: [u32; 3]) -> [f32; 3] {
        let [a, b, c] = triangle.map(|i| self.positions[i as usize]);
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ]
    }

    pub(crate) fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.uvs.clear();
        self.indices.clear();
    }
}

/// Receives chunk meshes (the renderer side).
///
/// Each call replaces whatever was previously stored at `index`.
pub trait MeshSink {
    /// Stores or replaces the mesh for `index`.
    fn set_mesh(&mut self, index: ChunkIndex, mesh: MeshData);

    /// Drops the mesh for `index`, if any.
    fn remove_mesh(&mut self, index: ChunkIndex);
}

/// Keeps meshes in a map. Useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct MeshCollector {
    meshes: HashMap<ChunkIndex, MeshData>,
    /// `set_mesh` calls received.
    pub sets: usize,
    /// `remove_mesh` calls received.
    pub removes: usize,
}

impl MeshCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh currently held for `index`.
    #[must_use]
    pub fn get(&self, index: ChunkIndex) -> Option<&MeshData> {
        self.meshes.get(&index)
    }

    /// Number of meshes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// True when no mesh is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl MeshSink for MeshCollector {
    fn set_mesh(&mut self, index: ChunkIndex, mesh: MeshData) {
        self.sets += 1;
        self.meshes.insert(index, mesh);
    }

    fn remove_mesh(&mut self, index: ChunkIndex) {
        self.removes += 1;
        self.meshes.remove(&index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_normal_follows_winding() {
        let mesh = MeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![0, 1, 2],
            ..MeshData::default()
        };
        assert_eq!(mesh.face_normal([0, 1, 2]), [0.0, 0.0, 1.0]);
        assert_eq!(mesh.face_normal([0, 2, 1]), [0.0, 0.0, -1.0]);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_collector_replaces() {
        let mut sink = MeshCollector::new();
        let index = ChunkIndex::new(0, 0);
        sink.set_mesh(index, MeshData::default());
        sink.set_mesh(index, MeshData { indices: vec![0, 0, 0], ..MeshData::default() });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get(index).map(MeshData::triangle_count), Some(1));
        sink.remove_mesh(index);
        assert!(sink.is_empty());
        assert_eq!((sink.sets, sink.removes), (2, 1));
    }
}
