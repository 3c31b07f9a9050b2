//! # Chunk System
//!
//! The world plane is cut into fixed-size chunks addressed by a 2D chunk
//! index. Every chunk holds `width x height x depth` voxels; depth is a thin
//! slab along `z` and is never chunked.
//!
//! All dimensions are powers of two, so world <-> chunk conversion is a shift
//! and a mask. Both behave correctly for negative coordinates: an arithmetic
//! right shift floors toward negative infinity and the mask yields the
//! non-negative remainder.
//!
//! ## Storage
//!
//! Voxels are a flat array indexed `x + y * width + z * width * height`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TerrainError, TerrainResult};
use crate::voxel::Voxel;

/// Largest supported log2 of a chunk's width or height.
pub const MAX_LOG_SIZE: u32 = 10;

/// Largest supported log2 of a chunk's depth.
pub const MAX_LOG_DEPTH: u32 = 6;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIndex {
    /// X coordinate (in chunks, not voxels).
    pub x: i32,
    /// Y coordinate (in chunks, not voxels).
    pub y: i32,
}

impl ChunkIndex {
    /// Creates a new chunk index.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the index offset by `(dx, dy)` chunks.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Power-of-two chunk extents, stored as log2 values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkDimensions {
    log_width: u32,
    log_height: u32,
    log_depth: u32,
}

impl ChunkDimensions {
    /// Creates chunk dimensions from log2 extents.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when width or height is below 2 voxels, or any
    /// extent exceeds the supported maximum.
    pub fn new(log_width: u32, log_height: u32, log_depth: u32) -> TerrainResult<Self> {
        if !(1..=MAX_LOG_SIZE).contains(&log_width) || !(1..=MAX_LOG_SIZE).contains(&log_height) {
            return Err(TerrainError::Configuration(format!(
                "chunk log width/height must be in 1..={MAX_LOG_SIZE}, got {log_width}x{log_height}"
            )));
        }
        if log_depth > MAX_LOG_DEPTH {
            return Err(TerrainError::Configuration(format!(
                "chunk log depth must be at most {MAX_LOG_DEPTH}, got {log_depth}"
            )));
        }
        Ok(Self {
            log_width,
            log_height,
            log_depth,
        })
    }

    /// log2 of the width.
    #[inline]
    #[must_use]
    pub const fn log_width(self) -> u32 {
        self.log_width
    }

    /// log2 of the height.
    #[inline]
    #[must_use]
    pub const fn log_height(self) -> u32 {
        self.log_height
    }

    /// log2 of the depth.
    #[inline]
    #[must_use]
    pub const fn log_depth(self) -> u32 {
        self.log_depth
    }

    /// Width in voxels.
    #[inline]
    #[must_use]
    pub const fn width(self) -> u32 {
        1 << self.log_width
    }

    /// Height in voxels.
    #[inline]
    #[must_use]
    pub const fn height(self) -> u32 {
        1 << self.log_height
    }

    /// Depth in voxels.
    #[inline]
    #[must_use]
    pub const fn depth(self) -> u32 {
        1 << self.log_depth
    }

    /// Total voxels per chunk.
    #[inline]
    #[must_use]
    pub const fn volume(self) -> usize {
        1 << (self.log_width + self.log_height + self.log_depth)
    }

    /// Chunk containing the world voxel `(world_x, world_y)`.
    #[inline]
    #[must_use]
    pub const fn chunk_index_of(self, world_x: i32, world_y: i32) -> ChunkIndex {
        ChunkIndex::new(world_x >> self.log_width, world_y >> self.log_height)
    }

    /// Position of the world voxel `(world_x, world_y)` inside its chunk.
    #[inline]
    #[must_use]
    pub const fn world_to_local(self, world_x: i32, world_y: i32) -> (u32, u32) {
        (
            (world_x & (self.width() as i32 - 1)) as u32,
            (world_y & (self.height() as i32 - 1)) as u32,
        )
    }

    /// World position of a chunk's `(0, 0)` voxel.
    #[inline]
    #[must_use]
    pub const fn chunk_origin(self, index: ChunkIndex) -> (i32, i32) {
        (index.x << self.log_width, index.y << self.log_height)
    }

    /// Recombines a chunk index and local position into world coordinates.
    #[inline]
    #[must_use]
    pub const fn local_to_world(self, index: ChunkIndex, local_x: u32, local_y: u32) -> (i32, i32) {
        let (ox, oy) = self.chunk_origin(index);
        (ox + local_x as i32, oy + local_y as i32)
    }

    /// Flat array index of a local position. Caller guarantees bounds.
    #[inline]
    #[must_use]
    pub const fn linear_index(self, x: u32, y: u32, z: u32) -> usize {
        (x as usize) | ((y as usize) << self.log_width) | ((z as usize) << (self.log_width + self.log_height))
    }

    /// Flat array index of a local position, checking every axis.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` naming the first axis outside the chunk.
    pub fn checked_index(self, x: i64, y: i64, z: i64) -> TerrainResult<usize> {
        check_axis("x", x, self.width())?;
        check_axis("y", y, self.height())?;
        check_axis("z", z, self.depth())?;
        Ok(self.linear_index(x as u32, y as u32, z as u32))
    }
}

fn check_axis(axis: &'static str, value: i64, limit: u32) -> TerrainResult<()> {
    if (0..i64::from(limit)).contains(&value) {
        Ok(())
    } else {
        Err(TerrainError::OutOfRange {
            axis,
            value,
            limit: i64::from(limit),
        })
    }
}

/// Which derived products must be kept current for a chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "UsageName", into = "UsageName")]
pub struct ChunkUsage(u8);

impl ChunkUsage {
    /// Voxel data only.
    pub const DATA: Self = Self(0);
    /// A render mesh is required.
    pub const RENDERING: Self = Self(1);
    /// A collision shape is required.
    pub const PHYSICS: Self = Self(2);
    /// Both mesh and collision shape are required.
    pub const BOTH: Self = Self(3);

    /// Wraps raw bits, dropping unknown ones.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set here.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when a render mesh is needed.
    #[inline]
    #[must_use]
    pub const fn needs_mesh(self) -> bool {
        self.contains(Self::RENDERING)
    }

    /// True when a collision shape is needed.
    #[inline]
    #[must_use]
    pub const fn needs_collision(self) -> bool {
        self.contains(Self::PHYSICS)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UsageName {
    Data,
    Rendering,
    Physics,
    Both,
}

impl From<UsageName> for ChunkUsage {
    fn from(name: UsageName) -> Self {
        match name {
            UsageName::Data => Self::DATA,
            UsageName::Rendering => Self::RENDERING,
            UsageName::Physics => Self::PHYSICS,
            UsageName::Both => Self::BOTH,
        }
    }
}

impl From<ChunkUsage> for UsageName {
    fn from(usage: ChunkUsage) -> Self {
        match usage.bits() {
            0 => Self::Data,
            1 => Self::Rendering,
            2 => Self::Physics,
            _ => Self::Both,
        }
    }
}

/// A chunk of terrain.
///
/// Contains a `width x height x depth` grid of voxels plus the bookkeeping
/// that decides when derived products must be rebuilt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    index: ChunkIndex,
    dims: ChunkDimensions,
    voxels: Box<[Voxel]>,
    usage: ChunkUsage,
    rebuild_required: bool,
}

impl Chunk {
    /// Creates a chunk filled with `fill`.
    #[must_use]
    pub fn new(index: ChunkIndex, dims: ChunkDimensions, fill: Voxel, usage: ChunkUsage) -> Self {
        Self {
            index,
            dims,
            voxels: vec![fill; dims.volume()].into_boxed_slice(),
            usage,
            rebuild_required: true,
        }
    }

    /// Creates a chunk from an existing voxel array.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the array length does not match `dims`.
    pub fn from_voxels(
        index: ChunkIndex,
        dims: ChunkDimensions,
        voxels: Vec<Voxel>,
        usage: ChunkUsage,
    ) -> TerrainResult<Self> {
        if voxels.len() != dims.volume() {
            return Err(TerrainError::InvalidArgument(format!(
                "chunk {index} expects {} voxels, got {}",
                dims.volume(),
                voxels.len()
            )));
        }
        Ok(Self {
            index,
            dims,
            voxels: voxels.into_boxed_slice(),
            usage,
            rebuild_required: true,
        })
    }

    /// Chunk position in the world.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> ChunkIndex {
        self.index
    }

    /// Chunk extents.
    #[inline]
    #[must_use]
    pub const fn dimensions(&self) -> ChunkDimensions {
        self.dims
    }

    /// Derived products this chunk needs.
    #[inline]
    #[must_use]
    pub const fn usage(&self) -> ChunkUsage {
        self.usage
    }

    /// Changes the derived products this chunk needs.
    pub fn set_usage(&mut self, usage: ChunkUsage) {
        if usage != self.usage {
            self.usage = usage;
            self.rebuild_required = true;
        }
    }

    /// Gets a voxel at local coordinates.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the position is outside the chunk.
    pub fn voxel(&self, x: i64, y: i64, z: i64) -> TerrainResult<Voxel> {
        let idx = self.dims.checked_index(x, y, z)?;
        Ok(self.voxels[idx])
    }

    /// Gets a voxel at local coordinates, `None` when outside the chunk.
    #[inline]
    #[must_use]
    pub fn get(&self, x: i32, y: i32, z: i32) -> Option<Voxel> {
        let inside = x >= 0
            && y >= 0
            && z >= 0
            && (x as u32) < self.dims.width()
            && (y as u32) < self.dims.height()
            && (z as u32) < self.dims.depth();
        inside.then(|| self.voxels[self.dims.linear_index(x as u32, y as u32, z as u32)])
    }

    /// Sets a voxel at local coordinates and flags the chunk for rebuild.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the position is outside the chunk.
    pub fn set_voxel(&mut self, x: i64, y: i64, z: i64, voxel: Voxel) -> TerrainResult<()> {
        let idx = self.dims.checked_index(x, y, z)?;
        if self.voxels[idx] != voxel {
            self.voxels[idx] = voxel;
            self.rebuild_required = true;
        }
        Ok(())
    }

    /// Raises the foreground density of every depth layer in a column.
    ///
    /// Returns true when any voxel changed; a change flags the chunk for
    /// rebuild.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the column is outside the chunk.
    pub fn raise_column(&mut self, x: i64, y: i64, density: u8) -> TerrainResult<bool> {
        self.dims.checked_index(x, y, 0)?;
        let mut changed = false;
        for z in 0..self.dims.depth() {
            let idx = self.dims.linear_index(x as u32, y as u32, z);
            changed |= self.voxels[idx].raise_foreground(density);
        }
        if changed {
            self.rebuild_required = true;
        }
        Ok(changed)
    }

    /// Fills every depth layer of a column with `voxel`.
    ///
    /// Used by generation; does not touch the rebuild flag.
    pub(crate) fn fill_column_unchecked(&mut self, x: u32, y: u32, voxel: Voxel) {
        for z in 0..self.dims.depth() {
            let idx = self.dims.linear_index(x, y, z);
            self.voxels[idx] = voxel;
        }
    }

    /// Read access to the flat voxel array.
    #[inline]
    #[must_use]
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    /// The voxel array as raw bytes (4 per voxel).
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.voxels)
    }

    /// True when derived products are stale.
    #[inline]
    #[must_use]
    pub const fn is_rebuild_required(&self) -> bool {
        self.rebuild_required
    }

    /// Flags derived products as stale.
    #[inline]
    pub fn mark_rebuild_required(&mut self) {
        self.rebuild_required = true;
    }

    /// Clears the stale flag after a rebuild.
    #[inline]
    pub fn clear_rebuild_required(&mut self) {
        self.rebuild_required = false;
    }
}

/// Column writer handed to terrain generators.
///
/// Generation writes whole columns and must not disturb rebuild bookkeeping.
pub struct ColumnWriter<'a> {
    chunk: &'a mut Chunk,
}

impl<'a> ColumnWriter<'a> {
    /// Wraps a chunk for column-wise filling.
    #[must_use]
    pub fn new(chunk: &'a mut Chunk) -> Self {
        Self { chunk }
    }

    /// Writes `voxel` into every depth layer of the local column `(x, y)`.
    ///
    /// Out-of-range columns are ignored.
    pub fn fill(&mut self, x: u32, y: u32, voxel: Voxel) {
        let dims = self.chunk.dims;
        if x < dims.width() && y < dims.height() {
            self.chunk.fill_column_unchecked(x, y, voxel);
        }
    }
}
