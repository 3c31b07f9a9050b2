//! # Terrain Mutator
//!
//! Digging in world lattice coordinates.
//!
//! Every operation addresses a world `(x, y)` column and raises the
//! foreground density of all of its depth layers. Density only ever rises,
//! so dug terrain never re-solidifies. Columns in chunks that are not loaded
//! are skipped.
//!
//! Touched chunks are collected and handed back by [`TerrainMutator::finish`].
//! A change within one voxel of a chunk border also flags the loaded
//! neighbor, whose border cells and normals sample it.

use std::collections::BTreeSet;

use tracing::{trace, warn};

use strata_core::chunk::ChunkIndex;
use strata_core::density::{segment_densities, Axis, Direction};
use strata_core::error::{TerrainError, TerrainResult};
use strata_core::store::TerrainStore;
use strata_core::voxel::DENSITY_MAX;

/// Applies digging operations to a store.
#[derive(Debug)]
pub struct TerrainMutator<'s> {
    store: &'s mut TerrainStore,
    affected: BTreeSet<ChunkIndex>,
}

impl<'s> TerrainMutator<'s> {
    /// Starts a batch of edits on `store`.
    pub fn new(store: &'s mut TerrainStore) -> Self {
        Self {
            store,
            affected: BTreeSet::new(),
        }
    }

    /// Raises the column at `(x, y)` to `density`.
    ///
    /// Returns true when a voxel changed. Lower densities are ignored.
    pub fn set_density_point(&mut self, x: i32, y: i32, density: u8) -> bool {
        let index = self.store.chunk_index_of(x, y);
        let (lx, ly) = self.store.world_to_local(x, y);
        let Some(chunk) = self.store.try_get_mut(index) else {
            return false;
        };
        let changed = match chunk.raise_column(i64::from(lx), i64::from(ly), density) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(x, y, chunk = %index, "Failed to raise column: {}", e);
                false
            }
        };
        if changed {
            self.affected.insert(index);
            self.flag_neighbors(index, lx, ly);
        }
        changed
    }

    /// Raises `length + 1` columns starting at `(x, y)` and stepping along
    /// `axis` in `direction`.
    ///
    /// A negative `length` does nothing. Returns the number of columns that
    /// changed.
    pub fn set_density_line(
        &mut self,
        x: i32,
        y: i32,
        length: i32,
        axis: Axis,
        direction: Direction,
        density: u8,
    ) -> usize {
        let (ux, uy) = axis.unit();
        let step = direction.sign();
        let mut changed = 0;
        for i in 0..=length {
            let (Some(px), Some(py)) = (
                x.checked_add(ux * step * i),
                y.checked_add(uy * step * i),
            ) else {
                break;
            };
            if self.set_density_point(px, py, density) {
                changed += 1;
            }
        }
        changed
    }

    /// Digs the lattice segment from `(x, y)` to its `+axis` neighbor so that
    /// the surface crosses it at `intersection`.
    ///
    /// `direction` names the open end, see [`segment_densities`].
    pub fn dig_segment(&mut self, x: i32, y: i32, axis: Axis, direction: Direction, intersection: f32) -> bool {
        let (near, far) = segment_densities(intersection, direction);
        let (ux, uy) = axis.unit();
        let near_changed = self.set_density_point(x, y, near);
        let far_changed = self.set_density_point(x.saturating_add(ux), y.saturating_add(uy), far);
        near_changed || far_changed
    }

    /// Digs a disk of `radius` around `origin`.
    ///
    /// Lattice points strictly inside become air. Each lattice segment the
    /// circle crosses is dug with the exact crossing position, found per
    /// column (`y = oy ± sqrt(r² - dx²)`) and per row.
    ///
    /// A zero radius digs nothing. The sweep is clipped to the loaded chunks,
    /// so the cost of a huge circle is bounded by what is loaded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-finite origin or a negative or
    /// non-finite radius.
    pub fn dig_circle(&mut self, origin: [f32; 2], radius: f32) -> TerrainResult<bool> {
        if !origin[0].is_finite() || !origin[1].is_finite() || !radius.is_finite() || radius < 0.0 {
            return Err(TerrainError::InvalidArgument(format!(
                "cannot dig circle at {origin:?} with radius {radius}"
            )));
        }
        if radius <= 0.0 {
            return Ok(false);
        }
        let Some((min, max)) = self.store.world_extent() else {
            return Ok(false);
        };
        let (ox, oy) = (f64::from(origin[0]), f64::from(origin[1]));
        let r = f64::from(radius);
        let mut changed = false;

        for x in sweep(ox, r, min[0], max[0]) {
            let (low, high) = chord(oy, r, f64::from(x) - ox);
            changed |= self.fill_run(Axis::Y, x, (low, high), (min[1], max[1]));
            changed |= self.dig_crossing(Axis::Y, x, high, (low, high), Direction::Negative);
            changed |= self.dig_crossing(Axis::Y, x, low, (low, high), Direction::Positive);
        }
        for y in sweep(oy, r, min[1], max[1]) {
            let (low, high) = chord(ox, r, f64::from(y) - oy);
            changed |= self.dig_crossing(Axis::X, y, high, (low, high), Direction::Negative);
            changed |= self.dig_crossing(Axis::X, y, low, (low, high), Direction::Positive);
        }

        trace!(?origin, radius, changed, "Dug circle");
        Ok(changed)
    }

    /// Chunks changed or flagged so far.
    pub fn affected(&self) -> impl Iterator<Item = ChunkIndex> + '_ {
        self.affected.iter().copied()
    }

    /// Ends the batch, returning the affected chunks in index order.
    #[must_use]
    pub fn finish(self) -> Vec<ChunkIndex> {
        self.affected.into_iter().collect()
    }

    /// Sets every lattice point strictly inside `run` on the line to air,
    /// visiting only positions within `limit`.
    fn fill_run(&mut self, axis: Axis, fixed: i32, run: (f64, f64), limit: (i32, i32)) -> bool {
        let mut changed = false;
        let first = (run.0.floor() + 1.0).max(f64::from(limit.0));
        for at in first as i32..=limit.1 {
            if f64::from(at) >= run.1 {
                break;
            }
            let (x, y) = along(axis, fixed, at);
            changed |= self.set_density_point(x, y, DENSITY_MAX);
        }
        changed
    }

    /// Digs the segment holding the crossing at `at`.
    ///
    /// Skipped when the segment's open end lies outside the chord, which only
    /// happens for a chord shorter than one voxel.
    fn dig_crossing(&mut self, axis: Axis, fixed: i32, at: f64, chord: (f64, f64), direction: Direction) -> bool {
        let near = at.floor();
        let open = match direction {
            Direction::Negative => near,
            Direction::Positive => near + 1.0,
        };
        if open < chord.0 || open > chord.1 || near < f64::from(i32::MIN) || near > f64::from(i32::MAX) {
            return false;
        }
        let (x, y) = along(axis, fixed, near as i32);
        self.dig_segment(x, y, axis, direction, (at - near) as f32)
    }

    fn flag_neighbors(&mut self, index: ChunkIndex, lx: u32, ly: u32) {
        let dims = self.store.dimensions();
        let xs = border_offsets(lx, dims.width());
        let ys = border_offsets(ly, dims.height());
        for &dy in ys.iter().flatten() {
            for &dx in xs.iter().flatten() {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let neighbor = index.offset(dx, dy);
                if let Some(chunk) = self.store.try_get_mut(neighbor) {
                    chunk.mark_rebuild_required();
                    self.affected.insert(neighbor);
                }
            }
        }
    }
}

/// Chord of the circle on the line at signed distance `offset` from the
/// center, as `(center - half, center + half)`.
fn chord(center: f64, radius: f64, offset: f64) -> (f64, f64) {
    let half = (radius * radius - offset * offset).max(0.0).sqrt();
    (center - half, center + half)
}

/// Lattice lines within `radius` of `center`, clipped to `lo..=hi`.
fn sweep(center: f64, radius: f64, lo: i32, hi: i32) -> impl Iterator<Item = i32> {
    let first = (center - radius).ceil().max(f64::from(lo));
    let last = (center + radius).floor().min(f64::from(hi));
    (first <= last).then(|| first as i32..=last as i32).into_iter().flatten()
}

fn along(axis: Axis, fixed: i32, at: i32) -> (i32, i32) {
    match axis {
        Axis::X => (at, fixed),
        Axis::Y => (fixed, at),
    }
}

/// Neighbor offsets whose meshes sample local coordinate `local`.
///
/// The previous chunk reads local `0` as a corner and local `1` for
/// gradients; the next chunk reads local `size - 1` for gradients.
fn border_offsets(local: u32, size: u32) -> [Option<i32>; 3] {
    [
        Some(0),
        (local <= 1).then_some(-1),
        (local + 1 >= size).then_some(1),
    ]
}
