//! # Active Region Bounds
//!
//! The visibility side of chunk streaming: which chunk rectangles must be
//! loaded right now.
//!
//! An actor's position is either stored locally or owned by a physics body.
//! The two cases are a tagged [`ActorPosition`] and are resolved explicitly
//! against a [`BodyPositions`] lookup when bounds are built.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use strata_core::chunk::{ChunkDimensions, ChunkIndex};

// ============================================================================
// POSITIONS
// ============================================================================

/// Handle of a body owned by an external physics engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

/// Where an actor's position lives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActorPosition {
    /// Stored on the actor, in world units.
    Local {
        /// World x.
        x: f32,
        /// World y.
        y: f32,
    },
    /// Read from a physics body each time it is needed.
    PhysicsBacked(BodyHandle),
}

impl ActorPosition {
    /// Resolves to world coordinates; `None` for a body the lookup does not
    /// know.
    #[must_use]
    pub fn resolve(&self, bodies: &dyn BodyPositions) -> Option<[f32; 2]> {
        match *self {
            Self::Local { x, y } => Some([x, y]),
            Self::PhysicsBacked(handle) => bodies.body_position(handle),
        }
    }
}

/// Position lookup for physics bodies.
pub trait BodyPositions {
    /// Current world position of `handle`.
    fn body_position(&self, handle: BodyHandle) -> Option<[f32; 2]>;
}

/// Lookup for worlds without physics: every body is unknown.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBodies;

impl BodyPositions for NoBodies {
    fn body_position(&self, _handle: BodyHandle) -> Option<[f32; 2]> {
        None
    }
}

impl BodyPositions for BTreeMap<BodyHandle, [f32; 2]> {
    fn body_position(&self, handle: BodyHandle) -> Option<[f32; 2]> {
        self.get(&handle).copied()
    }
}

// ============================================================================
// CHUNK BOUNDS
// ============================================================================

/// Inclusive rectangle of chunk indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkBounds {
    min: ChunkIndex,
    max: ChunkIndex,
}

impl ChunkBounds {
    /// Rectangle spanning both corners, in any order.
    #[must_use]
    pub fn new(a: ChunkIndex, b: ChunkIndex) -> Self {
        Self {
            min: ChunkIndex::new(a.x.min(b.x), a.y.min(b.y)),
            max: ChunkIndex::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Chunks within `radius` chunks of the one holding `position`.
    #[must_use]
    pub fn around(dims: ChunkDimensions, position: [f32; 2], radius: u32) -> Self {
        let center = dims.chunk_index_of(position[0].floor() as i32, position[1].floor() as i32);
        let r = radius.min(i32::MAX as u32) as i32;
        Self::new(center.offset(-r, -r), center.offset(r, r))
    }

    /// Lower corner.
    #[must_use]
    pub const fn min(&self) -> ChunkIndex {
        self.min
    }

    /// Upper corner.
    #[must_use]
    pub const fn max(&self) -> ChunkIndex {
        self.max
    }

    /// True when `index` lies inside.
    #[must_use]
    pub const fn contains(&self, index: ChunkIndex) -> bool {
        index.x >= self.min.x && index.x <= self.max.x && index.y >= self.min.y && index.y <= self.max.y
    }

    /// Number of chunks covered.
    #[must_use]
    pub fn len(&self) -> usize {
        let w = i64::from(self.max.x) - i64::from(self.min.x) + 1;
        let h = i64::from(self.max.y) - i64::from(self.min.y) + 1;
        (w * h) as usize
    }

    /// Always false; a rectangle covers at least one chunk.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Every covered index, row by row.
    pub fn iter(&self) -> impl Iterator<Item = ChunkIndex> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| ChunkIndex::new(x, y)))
    }
}

/// Supplies the rectangles that must stay loaded.
pub trait BoundsProvider {
    /// Current rectangles, one per active agent.
    fn active_bounds(&self) -> Vec<ChunkBounds>;
}

impl BoundsProvider for Vec<ChunkBounds> {
    fn active_bounds(&self) -> Vec<ChunkBounds> {
        self.clone()
    }
}

/// Union of `bounds`, sorted.
#[must_use]
pub fn union_of(bounds: &[ChunkBounds]) -> BTreeSet<ChunkIndex> {
    bounds.iter().flat_map(ChunkBounds::iter).collect()
}

// ============================================================================
// ACTOR TRACKING
// ============================================================================

/// Identifier of a tracked actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

/// A tracked actor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedActor {
    /// Where to read the position from.
    pub position: ActorPosition,
    /// View distance in chunks.
    pub view_radius: u32,
}

/// Keeps the region around each actor loaded.
#[derive(Debug)]
pub struct ActorTracker<B = NoBodies> {
    dims: ChunkDimensions,
    bodies: B,
    actors: BTreeMap<ActorId, TrackedActor>,
}

impl ActorTracker<NoBodies> {
    /// Tracker whose actors all have local positions.
    #[must_use]
    pub fn new(dims: ChunkDimensions) -> Self {
        Self::with_bodies(dims, NoBodies)
    }
}

impl<B: BodyPositions> ActorTracker<B> {
    /// Tracker resolving physics-backed positions through `bodies`.
    #[must_use]
    pub fn with_bodies(dims: ChunkDimensions, bodies: B) -> Self {
        Self {
            dims,
            bodies,
            actors: BTreeMap::new(),
        }
    }

    /// Starts tracking an actor, replacing any previous entry.
    pub fn track(&mut self, id: ActorId, actor: TrackedActor) {
        self.actors.insert(id, actor);
    }

    /// Stops tracking an actor.
    pub fn untrack(&mut self, id: ActorId) -> Option<TrackedActor> {
        self.actors.remove(&id)
    }

    /// Moves an actor to a local position.
    ///
    /// Returns false for an unknown actor. A physics-backed actor becomes
    /// local.
    pub fn set_local_position(&mut self, id: ActorId, x: f32, y: f32) -> bool {
        match self.actors.get_mut(&id) {
            Some(actor) => {
                actor.position = ActorPosition::Local { x, y };
                true
            }
            None => false,
        }
    }

    /// Body lookup, for updating body positions.
    pub fn bodies_mut(&mut self) -> &mut B {
        &mut self.bodies
    }

    /// Number of tracked actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

impl<B: BodyPositions> BoundsProvider for ActorTracker<B> {
    fn active_bounds(&self) -> Vec<ChunkBounds> {
        self.actors
            .iter()
            .filter_map(|(id, actor)| match actor.position.resolve(&self.bodies) {
                Some(position) => Some(ChunkBounds::around(self.dims, position, actor.view_radius)),
                None => {
                    warn!(actor = id.0, position = ?actor.position, "Actor has no resolvable position");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ChunkDimensions {
        ChunkDimensions::new(4, 4, 0).unwrap()
    }

    #[test]
    fn test_bounds_around_negative_position() {
        let bounds = ChunkBounds::around(dims(), [-0.5, 17.0], 1);
        assert_eq!(bounds.min(), ChunkIndex::new(-2, 0));
        assert_eq!(bounds.max(), ChunkIndex::new(0, 2));
        assert_eq!(bounds.len(), 9);
        assert_eq!(bounds.iter().count(), 9);
        assert!(bounds.contains(ChunkIndex::new(-1, 1)));
        assert!(!bounds.contains(ChunkIndex::new(1, 1)));
    }

    #[test]
    fn test_union_dedups() {
        let a = ChunkBounds::new(ChunkIndex::new(0, 0), ChunkIndex::new(1, 1));
        let b = ChunkBounds::new(ChunkIndex::new(2, 2), ChunkIndex::new(1, 1));
        assert_eq!(union_of(&[a, b]).len(), 7);
    }

    #[test]
    fn test_physics_backed_positions_resolve_through_lookup() {
        let mut bodies = BTreeMap::new();
        bodies.insert(BodyHandle(7), [40.0, 3.0]);
        let mut tracker = ActorTracker::with_bodies(dims(), bodies);
        tracker.track(
            ActorId(1),
            TrackedActor { position: ActorPosition::PhysicsBacked(BodyHandle(7)), view_radius: 0 },
        );
        tracker.track(
            ActorId(2),
            TrackedActor { position: ActorPosition::PhysicsBacked(BodyHandle(8)), view_radius: 0 },
        );

        let bounds = tracker.active_bounds();
        assert_eq!(bounds, vec![ChunkBounds::new(ChunkIndex::new(2, 0), ChunkIndex::new(2, 0))]);

        // The body moves; the next query follows it.
        tracker.bodies_mut().insert(BodyHandle(7), [-40.0, 3.0]);
        assert_eq!(tracker.active_bounds()[0].min(), ChunkIndex::new(-3, 0));

        // Detached from physics.
        assert!(tracker.set_local_position(ActorId(2), 0.0, 0.0));
        assert_eq!(tracker.active_bounds().len(), 2);
    }

    #[test]
    fn test_no_bodies() {
        let mut tracker = ActorTracker::new(dims());
        tracker.track(ActorId(1), TrackedActor { position: ActorPosition::PhysicsBacked(BodyHandle(1)), view_radius: 2 });
        assert!(tracker.active_bounds().is_empty());
        assert!(!tracker.set_local_position(ActorId(9), 1.0, 1.0));
    }
}
