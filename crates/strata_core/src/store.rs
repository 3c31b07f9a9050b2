//! # Terrain Store
//!
//! Owns every loaded chunk, keyed by chunk index.
//!
//! Other components only borrow chunks for the length of one operation.
//! A chunk is inserted fully populated, so consumers never observe a
//! partially generated chunk.

use std::collections::HashMap;

use crate::chunk::{Chunk, ChunkDimensions, ChunkIndex};
use crate::error::{TerrainError, TerrainResult};
use crate::voxel::Voxel;

/// Mapping from chunk index to chunk data.
#[derive(Debug)]
pub struct TerrainStore {
    dims: ChunkDimensions,
    chunks: HashMap<ChunkIndex, Chunk>,
}

impl TerrainStore {
    /// Creates an empty store for chunks of the given dimensions.
    #[must_use]
    pub fn new(dims: ChunkDimensions) -> Self {
        Self {
            dims,
            chunks: HashMap::new(),
        }
    }

    /// Chunk extents shared by every chunk in the store.
    #[inline]
    #[must_use]
    pub const fn dimensions(&self) -> ChunkDimensions {
        self.dims
    }

    /// Chunk containing a world voxel.
    #[inline]
    #[must_use]
    pub const fn chunk_index_of(&self, world_x: i32, world_y: i32) -> ChunkIndex {
        self.dims.chunk_index_of(world_x, world_y)
    }

    /// Position of a world voxel inside its chunk.
    #[inline]
    #[must_use]
    pub const fn world_to_local(&self, world_x: i32, world_y: i32) -> (u32, u32) {
        self.dims.world_to_local(world_x, world_y)
    }

    /// Looks up a chunk.
    #[inline]
    #[must_use]
    pub fn try_get(&self, index: ChunkIndex) -> Option<&Chunk> {
        self.chunks.get(&index)
    }

    /// Looks up a chunk for mutation.
    #[inline]
    pub fn try_get_mut(&mut self, index: ChunkIndex) -> Option<&mut Chunk> {
        self.chunks.get_mut(&index)
    }

    /// True when a chunk is registered at `index`.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: ChunkIndex) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Registers a chunk.
    ///
    /// # Errors
    ///
    /// - `DuplicateChunk` if `index` is already occupied.
    /// - `InvalidArgument` if the chunk's own index or dimensions disagree
    ///   with the store.
    pub fn add(&mut self, index: ChunkIndex, chunk: Chunk) -> TerrainResult<()> {
        if chunk.index() != index {
            return Err(TerrainError::InvalidArgument(format!(
                "chunk {} registered under index {index}",
                chunk.index()
            )));
        }
        if chunk.dimensions() != self.dims {
            return Err(TerrainError::InvalidArgument(format!(
                "chunk {index} has dimensions {}x{}x{}, store expects {}x{}x{}",
                chunk.dimensions().width(),
                chunk.dimensions().height(),
                chunk.dimensions().depth(),
                self.dims.width(),
                self.dims.height(),
                self.dims.depth(),
            )));
        }
        if self.chunks.contains_key(&index) {
            return Err(TerrainError::DuplicateChunk(index));
        }
        self.chunks.insert(index, chunk);
        Ok(())
    }

    /// Removes a chunk. Absent indices are a no-op returning `None`.
    pub fn remove(&mut self, index: ChunkIndex) -> Option<Chunk> {
        self.chunks.remove(&index)
    }

    /// Iterates over `(index, chunk)` pairs in unspecified order.
    ///
    /// Each call starts a fresh, independent iteration.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkIndex, &Chunk)> + '_ {
        self.chunks.iter().map(|(index, chunk)| (*index, chunk))
    }

    /// Indices of every loaded chunk, sorted.
    #[must_use]
    pub fn indices(&self) -> Vec<ChunkIndex> {
        let mut indices: Vec<_> = self.chunks.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Indices of chunks flagged for rebuild, sorted.
    #[must_use]
    pub fn dirty_indices(&self) -> Vec<ChunkIndex> {
        let mut indices: Vec<_> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.is_rebuild_required())
            .map(|(index, _)| *index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Number of loaded chunks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunk is loaded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Inclusive world voxel rectangle covering every loaded chunk, as
    /// `(min, max)`. `None` when nothing is loaded.
    #[must_use]
    pub fn world_extent(&self) -> Option<([i32; 2], [i32; 2])> {
        let mut keys = self.chunks.keys();
        let first = *keys.next()?;
        let (low, high) = keys.fold((first, first), |(low, high), index| {
            (
                ChunkIndex::new(low.x.min(index.x), low.y.min(index.y)),
                ChunkIndex::new(high.x.max(index.x), high.y.max(index.y)),
            )
        });
        let (min_x, min_y) = self.dims.chunk_origin(low);
        let (max_x, max_y) = self.dims.chunk_origin(high);
        Some((
            [min_x, min_y],
            [
                max_x.saturating_add(self.dims.width() as i32 - 1),
                max_y.saturating_add(self.dims.height() as i32 - 1),
            ],
        ))
    }

    /// Reads the voxel at a world position.
    ///
    /// `None` when the owning chunk is not loaded or `z` is outside the slab.
    #[must_use]
    pub fn voxel_at(&self, world_x: i32, world_y: i32, z: i32) -> Option<Voxel> {
        let chunk = self.try_get(self.chunk_index_of(world_x, world_y))?;
        let (lx, ly) = self.world_to_local(world_x, world_y);
        chunk.get(lx as i32, ly as i32, z)
    }
}
