//! # Job Scheduler
//!
//! Admission control for terrain edits.
//!
//! ```text
//! schedule(job)
//!   ├─ touched chunks from the job's bounding box
//!   ├─ begin_enqueue_chunks ── every ChunkJobQueue::can_proceed? ── no ──> skipped
//!   │                                        │ yes
//!   ├─ reserve chunks (+ SyncBarrier when more than one chunk)
//!   ├─ end_enqueue_chunks
//!   └─ push to the bounded job channel
//! take_next() ─> apply ─> complete(job) releases the reservations
//! ```
//!
//! Admission is all-or-nothing: a multi-chunk edit is either reserved on
//! every chunk it touches or skipped entirely. The evaluate-then-reserve
//! sequence runs under one lock, so two schedulers can never both see the
//! same chunk as free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use strata_core::chunk::{ChunkDimensions, ChunkIndex};
use strata_core::density::{Axis, Direction};
use strata_core::error::TerrainResult;

use crate::mutator::TerrainMutator;

/// Jobs a single chunk accepts before further work is turned away.
pub const DEFAULT_CHUNK_CAPACITY: usize = 8;

/// Most chunks one job may reserve.
pub const DEFAULT_MAX_JOB_CHUNKS: u64 = 1024;

/// A terrain edit waiting to be applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TerrainJob {
    /// [`TerrainMutator::dig_circle`].
    DigCircle {
        /// Center in world units.
        origin: [f32; 2],
        /// Radius in voxels.
        radius: f32,
    },
    /// [`TerrainMutator::dig_segment`].
    DigSegment {
        /// Near lattice point.
        corner: [i32; 2],
        /// Segment axis.
        axis: Axis,
        /// Open end.
        direction: Direction,
        /// Crossing position along the segment.
        intersection: f32,
    },
    /// [`TerrainMutator::set_density_point`].
    SetDensityPoint {
        /// World column.
        position: [i32; 2],
        /// Target density.
        density: u8,
    },
    /// [`TerrainMutator::set_density_line`].
    SetDensityLine {
        /// First column.
        start: [i32; 2],
        /// Columns after the first.
        length: i32,
        /// Step axis.
        axis: Axis,
        /// Step direction.
        direction: Direction,
        /// Target density.
        density: u8,
    },
}

impl TerrainJob {
    /// Inclusive world bounding box of every column the job can write,
    /// `None` when it writes nothing.
    #[must_use]
    pub fn bounds(&self) -> Option<([i32; 2], [i32; 2])> {
        match *self {
            Self::DigCircle { origin, radius } => {
                if !radius.is_finite() || radius < 0.0 || !origin.iter().all(|c| c.is_finite()) {
                    return None;
                }
                let r = f64::from(radius);
                // Crossing segments reach one voxel past the circle.
                let min = origin.map(|c| ((f64::from(c) - r).floor() as i32).saturating_sub(1));
                let max = origin.map(|c| ((f64::from(c) + r).floor() as i32).saturating_add(1));
                Some((min, max))
            }
            Self::DigSegment { corner, axis, .. } => {
                let (ux, uy) = axis.unit();
                Some((corner, [corner[0].saturating_add(ux), corner[1].saturating_add(uy)]))
            }
            Self::SetDensityPoint { position, .. } => Some((position, position)),
            Self::SetDensityLine { start, length, axis, direction, .. } => {
                if length < 0 {
                    return None;
                }
                let (ux, uy) = axis.unit();
                let step = direction.sign();
                let end = [
                    start[0].saturating_add(ux * step * length),
                    start[1].saturating_add(uy * step * length),
                ];
                Some((
                    [start[0].min(end[0]), start[1].min(end[1])],
                    [start[0].max(end[0]), start[1].max(end[1])],
                ))
            }
        }
    }

    /// Number of chunks the job's bounding box overlaps.
    #[must_use]
    pub fn touched_chunk_count(&self, dims: ChunkDimensions) -> u64 {
        let Some((min, max)) = self.bounds() else {
            return 0;
        };
        let low = dims.chunk_index_of(min[0], min[1]);
        let high = dims.chunk_index_of(max[0], max[1]);
        let w = (i64::from(high.x) - i64::from(low.x) + 1) as u64;
        let h = (i64::from(high.y) - i64::from(low.y) + 1) as u64;
        w.saturating_mul(h)
    }

    /// Chunks the job's bounding box overlaps, in index order.
    ///
    /// Check [`Self::touched_chunk_count`] first for jobs of unbounded size.
    #[must_use]
    pub fn touched_chunks(&self, dims: ChunkDimensions) -> Vec<ChunkIndex> {
        let Some((min, max)) = self.bounds() else {
            return Vec::new();
        };
        let low = dims.chunk_index_of(min[0], min[1]);
        let high = dims.chunk_index_of(max[0], max[1]);
        let mut chunks = Vec::new();
        for x in low.x..=high.x {
            for y in low.y..=high.y {
                chunks.push(ChunkIndex::new(x, y));
            }
        }
        chunks
    }

    /// Applies the job.
    ///
    /// # Errors
    ///
    /// Propagates `InvalidArgument` from [`TerrainMutator::dig_circle`].
    pub fn apply(&self, mutator: &mut TerrainMutator<'_>) -> TerrainResult<()> {
        match *self {
            Self::DigCircle { origin, radius } => {
                mutator.dig_circle(origin, radius)?;
            }
            Self::DigSegment { corner, axis, direction, intersection } => {
                mutator.dig_segment(corner[0], corner[1], axis, direction, intersection);
            }
            Self::SetDensityPoint { position, density } => {
                mutator.set_density_point(position[0], position[1], density);
            }
            Self::SetDensityLine { start, length, axis, direction, density } => {
                mutator.set_density_line(start[0], start[1], length, axis, direction, density);
            }
        }
        Ok(())
    }
}

/// Identifier of an admitted job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// Token binding a multi-chunk job to all of its chunks.
///
/// While a barrier holds a chunk, no other job is admitted on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncBarrier {
    id: u64,
    chunks: Vec<ChunkIndex>,
}

impl SyncBarrier {
    /// Barrier identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Chunks updated as one unit.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkIndex] {
        &self.chunks
    }
}

/// An admitted job with its reservations.
#[derive(Clone, Debug)]
pub struct ScheduledJob {
    /// Job identifier.
    pub id: JobId,
    /// The edit.
    pub job: TerrainJob,
    /// Reserved chunks.
    pub chunks: Vec<ChunkIndex>,
    /// Present when the job spans more than one chunk.
    pub barrier: Option<SyncBarrier>,
}

/// Per-chunk admission state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkJobQueue {
    pending: usize,
    barrier: Option<u64>,
}

impl ChunkJobQueue {
    /// Admitted jobs not yet completed.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Barrier currently holding this chunk.
    #[must_use]
    pub const fn barrier(&self) -> Option<u64> {
        self.barrier
    }

    /// Whether a new job may be reserved on this chunk.
    ///
    /// A chunk held by a barrier admits nothing. A synchronized job needs the
    /// chunk idle; a single-chunk job only needs spare capacity.
    #[must_use]
    pub const fn can_proceed(&self, synchronized: bool, capacity: usize) -> bool {
        self.barrier.is_none() && (!synchronized || self.pending == 0) && self.pending < capacity
    }

    fn reserve(&mut self, barrier: Option<u64>) {
        self.pending += 1;
        if barrier.is_some() {
            self.barrier = barrier;
        }
    }

    fn release(&mut self, barrier: Option<u64>) {
        self.pending = self.pending.saturating_sub(1);
        if barrier.is_some() && self.barrier == barrier {
            self.barrier = None;
        }
    }
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs admitted.
    pub admitted: u64,
    /// Jobs turned away.
    pub skipped: u64,
    /// Jobs completed.
    pub completed: u64,
}

/// Open reservation bracket, from [`JobScheduler::begin_enqueue_chunks`].
///
/// Holds the queue lock; evaluation and reservation inside one bracket are
/// atomic with respect to every other scheduler call.
pub struct EnqueueBracket<'a> {
    queues: MutexGuard<'a, HashMap<ChunkIndex, ChunkJobQueue>>,
    capacity: usize,
}

impl EnqueueBracket<'_> {
    /// True when every chunk admits a job of this kind.
    #[must_use]
    pub fn can_proceed(&self, chunks: &[ChunkIndex], synchronized: bool) -> bool {
        chunks.iter().all(|index| {
            self.queues
                .get(index)
                .map_or(true, |queue| queue.can_proceed(synchronized, self.capacity))
        })
    }

    /// Reserves every chunk.
    pub fn reserve(&mut self, chunks: &[ChunkIndex], barrier: Option<&SyncBarrier>) {
        let id = barrier.map(SyncBarrier::id);
        for &index in chunks {
            self.queues.entry(index).or_default().reserve(id);
        }
    }

    /// Undoes [`Self::reserve`].
    pub fn release(&mut self, chunks: &[ChunkIndex], barrier: Option<&SyncBarrier>) {
        let id = barrier.map(SyncBarrier::id);
        for index in chunks {
            if let Some(queue) = self.queues.get_mut(index) {
                queue.release(id);
                if queue.pending == 0 && queue.barrier.is_none() {
                    self.queues.remove(index);
                }
            }
        }
    }
}

/// Admits terrain jobs and queues them for the engine.
///
/// Shareable across threads behind an `Arc`.
pub struct JobScheduler {
    dims: ChunkDimensions,
    capacity: usize,
    max_job_chunks: u64,
    queues: Mutex<HashMap<ChunkIndex, ChunkJobQueue>>,
    sender: Sender<ScheduledJob>,
    receiver: Receiver<ScheduledJob>,
    next_job: AtomicU64,
    next_barrier: AtomicU64,
    admitted: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
}

impl JobScheduler {
    /// Creates a scheduler holding at most `queue_capacity` admitted jobs.
    #[must_use]
    pub fn new(dims: ChunkDimensions, queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded(queue_capacity.max(1));
        Self {
            dims,
            capacity: DEFAULT_CHUNK_CAPACITY,
            max_job_chunks: DEFAULT_MAX_JOB_CHUNKS,
            queues: Mutex::new(HashMap::new()),
            sender,
            receiver,
            next_job: AtomicU64::new(1),
            next_barrier: AtomicU64::new(1),
            admitted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Sets how many jobs one chunk accepts at a time.
    #[must_use]
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets how many chunks one job may reserve.
    #[must_use]
    pub fn with_max_job_chunks(mut self, max: u64) -> Self {
        self.max_job_chunks = max.max(1);
        self
    }

    /// Opens a reservation bracket.
    pub fn begin_enqueue_chunks(&self) -> EnqueueBracket<'_> {
        EnqueueBracket {
            queues: self.queues.lock(),
            capacity: self.capacity,
        }
    }

    /// Closes a reservation bracket.
    pub fn end_enqueue_chunks(&self, bracket: EnqueueBracket<'_>) {
        drop(bracket);
    }

    /// Admits `job` or skips it.
    ///
    /// Returns the job ID when admitted. A job is skipped when it touches no
    /// chunk or more chunks than the per-job limit, when any touched chunk
    /// refuses it, or when the job queue is full.
    pub fn schedule(&self, job: TerrainJob) -> Option<JobId> {
        if job.touched_chunk_count(self.dims) > self.max_job_chunks {
            self.skip(&job, "too many chunks");
            return None;
        }
        let chunks = job.touched_chunks(self.dims);
        if chunks.is_empty() {
            self.skip(&job, "empty bounds");
            return None;
        }
        let barrier = (chunks.len() > 1).then(|| SyncBarrier {
            id: self.next_barrier.fetch_add(1, Ordering::Relaxed),
            chunks: chunks.clone(),
        });

        let mut bracket = self.begin_enqueue_chunks();
        if !bracket.can_proceed(&chunks, barrier.is_some()) {
            self.end_enqueue_chunks(bracket);
            self.skip(&job, "chunk busy");
            return None;
        }
        bracket.reserve(&chunks, barrier.as_ref());

        let id = JobId(self.next_job.fetch_add(1, Ordering::Relaxed));
        let scheduled = ScheduledJob { id, job, chunks, barrier };
        match self.sender.try_send(scheduled) {
            Ok(()) => {
                self.end_enqueue_chunks(bracket);
                self.admitted.fetch_add(1, Ordering::Relaxed);
                Some(id)
            }
            Err(TrySendError::Full(scheduled) | TrySendError::Disconnected(scheduled)) => {
                bracket.release(&scheduled.chunks, scheduled.barrier.as_ref());
                self.end_enqueue_chunks(bracket);
                self.skip(&job, "queue full");
                None
            }
        }
    }

    /// Next admitted job, without blocking.
    #[must_use]
    pub fn take_next(&self) -> Option<ScheduledJob> {
        self.receiver.try_recv().ok()
    }

    /// Releases the reservations of a finished job.
    pub fn complete(&self, job: &ScheduledJob) {
        let mut bracket = self.begin_enqueue_chunks();
        bracket.release(&job.chunks, job.barrier.as_ref());
        self.end_enqueue_chunks(bracket);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Admitted jobs waiting to be taken.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Snapshot of one chunk's admission state.
    #[must_use]
    pub fn chunk_queue(&self, index: ChunkIndex) -> ChunkJobQueue {
        self.queues.lock().get(&index).cloned().unwrap_or_default()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }

    fn skip(&self, job: &TerrainJob, reason: &str) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        debug!(?job, reason, "Skipped terrain job");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn scheduler() -> JobScheduler {
        JobScheduler::new(ChunkDimensions::new(4, 4, 0).unwrap(), 64)
    }

    fn dig(x: f32, y: f32, radius: f32) -> TerrainJob {
        TerrainJob::DigCircle { origin: [x, y], radius }
    }

    #[test]
    fn test_touched_chunks() {
        let dims = ChunkDimensions::new(4, 4, 0).unwrap();
        assert_eq!(dig(8.0, 8.0, 2.0).touched_chunks(dims), vec![ChunkIndex::new(0, 0)]);
        // Crosses x = 16 and y = 0.
        let chunks = dig(15.0, 1.0, 2.0).touched_chunks(dims);
        assert_eq!(
            chunks,
            vec![
                ChunkIndex::new(0, -1),
                ChunkIndex::new(0, 0),
                ChunkIndex::new(1, -1),
                ChunkIndex::new(1, 0),
            ]
        );
        let line = TerrainJob::SetDensityLine {
            start: [3, 3],
            length: -1,
            axis: Axis::X,
            direction: Direction::Positive,
            density: 15,
        };
        assert!(line.touched_chunks(dims).is_empty());
    }

    #[test]
    fn test_huge_radius_bounds_saturate() {
        let job = dig(0.0, 0.0, 3.0e9);
        assert_eq!(job.bounds(), Some(([i32::MIN, i32::MIN], [i32::MAX, i32::MAX])));
        let dims = ChunkDimensions::new(4, 4, 0).unwrap();
        assert_eq!(job.touched_chunk_count(dims), 1 << 56);
    }

    #[test]
    fn test_oversized_job_is_skipped() {
        let scheduler = scheduler();
        assert!(scheduler.schedule(dig(0.0, 0.0, 3.0e9)).is_none());
        assert_eq!(scheduler.stats().skipped, 1);
        assert_eq!(scheduler.queued(), 0);

        // 3x3 chunks, over a limit of 4.
        let scheduler = scheduler.with_max_job_chunks(4);
        assert!(scheduler.schedule(dig(24.0, 24.0, 12.0)).is_none());
        assert!(scheduler.schedule(dig(16.0, 16.0, 3.0)).is_some());
    }

    #[test]
    fn test_single_chunk_jobs_stack() {
        let scheduler = scheduler();
        assert!(scheduler.schedule(dig(8.0, 8.0, 1.0)).is_some());
        assert!(scheduler.schedule(dig(9.0, 8.0, 1.0)).is_some());
        assert_eq!(scheduler.chunk_queue(ChunkIndex::new(0, 0)).pending(), 2);
        assert_eq!(scheduler.queued(), 2);
    }

    #[test]
    fn test_multi_chunk_job_is_all_or_nothing() {
        let scheduler = scheduler();
        // Busy chunk (1, 0).
        let single = scheduler.schedule(dig(24.0, 8.0, 1.0));
        assert!(single.is_some());

        // Spans (0, 0) and (1, 0): refused on (1, 0), so nothing is reserved.
        assert!(scheduler.schedule(dig(16.0, 8.0, 2.0)).is_none());
        assert_eq!(scheduler.chunk_queue(ChunkIndex::new(0, 0)), ChunkJobQueue::default());
        assert_eq!(scheduler.stats().skipped, 1);

        let job = scheduler.take_next().unwrap();
        scheduler.complete(&job);
        let id = scheduler.schedule(dig(16.0, 8.0, 2.0));
        assert!(id.is_some(), "admitted once the chunk is idle");

        let job = scheduler.take_next().unwrap();
        let barrier = job.barrier.clone().unwrap();
        assert_eq!(barrier.chunks(), job.chunks.as_slice());
        assert_eq!(scheduler.chunk_queue(ChunkIndex::new(0, 0)).barrier(), Some(barrier.id()));

        // Held by the barrier: even a single-chunk job waits.
        assert!(scheduler.schedule(dig(4.0, 8.0, 1.0)).is_none());
        scheduler.complete(&job);
        assert!(scheduler.schedule(dig(4.0, 8.0, 1.0)).is_some());
    }

    #[test]
    fn test_chunk_capacity() {
        let scheduler = scheduler().with_chunk_capacity(2);
        assert!(scheduler.schedule(dig(8.0, 8.0, 1.0)).is_some());
        assert!(scheduler.schedule(dig(8.0, 8.0, 1.0)).is_some());
        assert!(scheduler.schedule(dig(8.0, 8.0, 1.0)).is_none());
    }

    #[test]
    fn test_full_queue_releases_reservation() {
        let scheduler = JobScheduler::new(ChunkDimensions::new(4, 4, 0).unwrap(), 1);
        assert!(scheduler.schedule(dig(8.0, 8.0, 1.0)).is_some());
        assert!(scheduler.schedule(dig(40.0, 8.0, 1.0)).is_none());
        assert_eq!(scheduler.chunk_queue(ChunkIndex::new(2, 0)), ChunkJobQueue::default());
    }

    #[test]
    fn test_concurrent_overlapping_multi_chunk_jobs() {
        // Every job spans the same four chunks; only one may hold them.
        let scheduler = Arc::new(scheduler());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || scheduler.schedule(dig(16.0, 16.0, 3.0)).is_some())
            })
            .collect();
        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|&ok| ok).count();
        assert_eq!(admitted, 1);
        assert_eq!(scheduler.stats().admitted, 1);
        assert_eq!(scheduler.stats().skipped, 7);
    }
}
