//! Sub-voxel boundary placement.
//!
//! A surface crossing between two neighboring lattice points is stored as a
//! pair of quantized densities. Marching cubes later recovers the crossing
//! by interpolating along the same segment, so the boundary keeps its
//! fractional position instead of snapping to whole voxels.

use crate::voxel::{quantize_density, DENSITY_MAX, DENSITY_SOLID, ISOLEVEL};

/// Lattice axis in the world plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Horizontal.
    X,
    /// Vertical.
    Y,
}

impl Axis {
    /// Unit step along the axis.
    #[inline]
    #[must_use]
    pub const fn unit(self) -> (i32, i32) {
        match self {
            Self::X => (1, 0),
            Self::Y => (0, 1),
        }
    }
}

/// Sign along an [`Axis`].
///
/// For a segment from a lattice point to its `+axis` neighbor, the
/// direction names which end is open (dug): `Negative` means the near end,
/// `Positive` the far end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward decreasing coordinates.
    Negative,
    /// Toward increasing coordinates.
    Positive,
}

impl Direction {
    /// `-1` or `+1`.
    #[inline]
    #[must_use]
    pub const fn sign(self) -> i32 {
        match self {
            Self::Negative => -1,
            Self::Positive => 1,
        }
    }
}

/// Converts a boundary crossing into `(near, far)` densities.
///
/// `intersection` is the crossing's position along the segment, `0.0` at the
/// near lattice point and `1.0` at the far one. `direction` selects which end
/// is open. The mapping is piecewise-linear in the distance `t` from the open
/// end to the crossing:
///
/// - `t <= 0.5`: the open end rises from the isolevel (at `t = 0`) to full
///   air (at `t = 0.5`); the closed end stays solid.
/// - `t > 0.5`: the open end is full air; the closed end rises from solid
///   (at `t = 0.5`) to the isolevel (at `t = 1`).
#[must_use]
pub fn segment_densities(intersection: f32, direction: Direction) -> (u8, u8) {
    let intersection = intersection.clamp(0.0, 1.0);
    match direction {
        Direction::Negative => open_then_closed(intersection),
        Direction::Positive => {
            let (open, closed) = open_then_closed(1.0 - intersection);
            (closed, open)
        }
    }
}

/// Density of the row holding a surface at `fraction` of a voxel above it.
///
/// Falls linearly from the isolevel (surface on the row, `0.0`) to solid
/// (surface one voxel higher, `1.0`). The row above is always air, so the
/// mapping stays strictly ordered over the whole voxel.
#[must_use]
pub fn surface_row_density(fraction: f32) -> u8 {
    quantize_density(ISOLEVEL * (1.0 - fraction.clamp(0.0, 1.0)))
}

fn open_then_closed(t: f32) -> (u8, u8) {
    let max = f32::from(DENSITY_MAX);
    if t > 0.5 {
        (DENSITY_MAX, quantize_density(ISOLEVEL * (2.0 * t - 1.0)))
    } else {
        (quantize_density(ISOLEVEL + (max - ISOLEVEL) * 2.0 * t), DENSITY_SOLID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoints() {
        // Crossing on the open end: that end sits on the surface.
        assert_eq!(segment_densities(0.0, Direction::Negative), (8, DENSITY_SOLID));
        // Crossing halfway: open end is air, closed end solid.
        assert_eq!(segment_densities(0.5, Direction::Negative), (DENSITY_MAX, DENSITY_SOLID));
        // Crossing on the closed end.
        assert_eq!(segment_densities(1.0, Direction::Negative), (DENSITY_MAX, 8));
    }

    #[test]
    fn test_positive_mirrors_negative() {
        for step in 0..=20 {
            let s = step as f32 / 20.0;
            let (near, far) = segment_densities(s, Direction::Positive);
            let (m_near, m_far) = segment_densities(1.0 - s, Direction::Negative);
            assert_eq!((near, far), (m_far, m_near), "s = {s}");
        }
    }

    #[test]
    fn test_open_end_never_below_closed_end() {
        for step in 0..=100 {
            let s = step as f32 / 100.0;
            let (open, closed) = segment_densities(s, Direction::Negative);
            assert!(open >= closed, "s = {s}: {open} < {closed}");
        }
    }

    #[test]
    fn test_surface_row_density_covers_whole_voxel() {
        assert_eq!(surface_row_density(0.0), 8);
        assert_eq!(surface_row_density(1.0), DENSITY_SOLID);
        let mut previous = DENSITY_MAX;
        for step in 0..=100 {
            let f = step as f32 / 100.0;
            let density = surface_row_density(f);
            assert!(density <= previous, "f = {f}: {density} > {previous}");
            previous = density;
        }
        // The upper half of a voxel still resolves.
        assert!(surface_row_density(0.6) > surface_row_density(0.9));
        assert!(surface_row_density(0.9) > DENSITY_SOLID);
    }

    #[test]
    fn test_intersection_is_clamped() {
        assert_eq!(segment_densities(-4.0, Direction::Negative), segment_densities(0.0, Direction::Negative));
        assert_eq!(segment_densities(3.0, Direction::Positive), segment_densities(1.0, Direction::Positive));
    }
}
