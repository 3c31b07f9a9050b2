//! # Write-Behind Serializer
//!
//! Moves chunk serialization off the caller's thread.
//!
//! ## Design
//!
//! `try_serialize` copies the chunk into a bounded queue drained by a fixed
//! pool of worker threads. Each accepted write gets a version from a global
//! counter and bumps a per-index pending count.
//!
//! - Writes for one index never run concurrently, and a write never replaces
//!   data from a newer version.
//! - `try_deserialize` blocks until the index has no pending write, so a
//!   reader never observes a half-written chunk.
//! - A full queue blocks the caller (backpressure).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use strata_core::chunk::{Chunk, ChunkIndex};
use strata_core::error::{TerrainError, TerrainResult};

use crate::chunk_persistence::ChunkSerializer;

/// Queued write.
struct WriteJob {
    index: ChunkIndex,
    chunk: Chunk,
    version: u64,
}

#[derive(Default)]
struct Slot {
    pending: usize,
    writing: bool,
    written_version: u64,
}

/// Per-index bookkeeping shared with the workers.
#[derive(Default)]
struct InFlight {
    slots: Mutex<HashMap<ChunkIndex, Slot>>,
    changed: Condvar,
    errors: Mutex<Vec<TerrainError>>,
}

impl InFlight {
    fn reserve(&self, index: ChunkIndex) {
        self.slots.lock().entry(index).or_default().pending += 1;
    }

    fn release(&self, index: ChunkIndex) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&index) {
            slot.pending = slot.pending.saturating_sub(1);
            if slot.pending == 0 && !slot.writing {
                slots.remove(&index);
            }
        }
        self.changed.notify_all();
    }

    fn wait_index(&self, index: ChunkIndex) {
        let mut slots = self.slots.lock();
        while slots.get(&index).is_some_and(|slot| slot.pending > 0) {
            self.changed.wait(&mut slots);
        }
    }

    fn wait_all(&self) {
        let mut slots = self.slots.lock();
        while slots.values().any(|slot| slot.pending > 0) {
            self.changed.wait(&mut slots);
        }
    }

    fn pending(&self, index: ChunkIndex) -> usize {
        self.slots.lock().get(&index).map_or(0, |slot| slot.pending)
    }
}

/// Serializer that persists through a background worker pool.
pub struct WriteBehindSerializer {
    inner: Arc<dyn ChunkSerializer>,
    sender: Mutex<Option<Sender<WriteJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<InFlight>,
    next_version: AtomicU64,
}

impl WriteBehindSerializer {
    /// Starts `workers` threads writing into `inner`.
    ///
    /// # Errors
    ///
    /// - `Configuration` for zero workers or zero queue capacity.
    /// - `Serialization` if a thread cannot be spawned.
    pub fn new(inner: Arc<dyn ChunkSerializer>, workers: usize, queue_capacity: usize) -> TerrainResult<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(TerrainError::Configuration(format!(
                "write-behind needs at least one worker and one queue slot, got {workers}/{queue_capacity}"
            )));
        }

        let (sender, receiver) = bounded::<WriteJob>(queue_capacity);
        let in_flight = Arc::new(InFlight::default());
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = receiver.clone();
            let inner = Arc::clone(&inner);
            let in_flight = Arc::clone(&in_flight);
            let handle = thread::Builder::new()
                .name(format!("strata-writer-{id}"))
                .spawn(move || worker_loop(&receiver, inner.as_ref(), &in_flight))
                .map_err(|e| TerrainError::io("spawning writer thread", &e))?;
            handles.push(handle);
        }
        info!("Write-behind started: {} workers, queue capacity {}", workers, queue_capacity);

        Ok(Self {
            inner,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            in_flight,
            next_version: AtomicU64::new(1),
        })
    }

    /// Writes not yet completed for `index`.
    #[must_use]
    pub fn pending(&self, index: ChunkIndex) -> usize {
        self.in_flight.pending(index)
    }

    /// True until [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Drains the queue and joins every worker. Idempotent.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Writer thread panicked");
            }
        }
        info!("Write-behind stopped: {} workers joined", count);
    }
}

impl ChunkSerializer for WriteBehindSerializer {
    fn try_serialize(&self, index: ChunkIndex, chunk: &Chunk) -> TerrainResult<()> {
        let sender = self
            .sender
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TerrainError::WorkerUnavailable)?;

        self.in_flight.reserve(index);
        let job = WriteJob {
            index,
            chunk: chunk.clone(),
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
        };
        if sender.send(job).is_err() {
            self.in_flight.release(index);
            return Err(TerrainError::WorkerUnavailable);
        }
        Ok(())
    }

    fn try_deserialize(&self, index: ChunkIndex) -> TerrainResult<Option<Chunk>> {
        self.in_flight.wait_index(index);
        self.inner.try_deserialize(index)
    }

    fn flush(&self) -> TerrainResult<()> {
        self.in_flight.wait_all();
        let mut errors = self.in_flight.errors.lock();
        let result = match errors.drain(..).next() {
            Some(err) => Err(err),
            None => self.inner.flush(),
        };
        result
    }
}

impl Drop for WriteBehindSerializer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Receiver<WriteJob>, inner: &dyn ChunkSerializer, in_flight: &InFlight) {
    for job in receiver.iter() {
        let stale = {
            let mut slots = in_flight.slots.lock();
            loop {
                let slot = slots.entry(job.index).or_default();
                if !slot.writing {
                    break;
                }
                in_flight.changed.wait(&mut slots);
            }
            let slot = slots.entry(job.index).or_default();
            let stale = job.version <= slot.written_version;
            slot.writing = !stale;
            stale
        };

        if !stale {
            let result = inner.try_serialize(job.index, &job.chunk);
            {
                let mut slots = in_flight.slots.lock();
                let slot = slots.entry(job.index).or_default();
                slot.writing = false;
                slot.written_version = job.version;
            }
            if let Err(err) = result {
                warn!("Background write of chunk {} failed: {}", job.index, err);
                in_flight.errors.lock().push(err);
            }
        }
        in_flight.release(job.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_persistence::MemorySerializer;
    use strata_core::chunk::{ChunkDimensions, ChunkUsage};
    use strata_core::voxel::{Material, Voxel};

    fn chunk(index: ChunkIndex, fill: Voxel) -> Chunk {
        Chunk::new(index, ChunkDimensions::new(2, 2, 0).unwrap(), fill, ChunkUsage::DATA)
    }

    #[test]
    fn test_read_after_write_sees_latest() {
        let memory = Arc::new(MemorySerializer::new());
        let writer = WriteBehindSerializer::new(memory.clone(), 4, 8).unwrap();
        let index = ChunkIndex::new(1, 2);

        for density in 0..15u8 {
            writer
                .try_serialize(index, &chunk(index, Voxel::with_density(Material::Dirt, density)))
                .unwrap();
        }
        let loaded = writer.try_deserialize(index).unwrap().unwrap();
        assert_eq!(loaded.voxels()[0].foreground(), 14, "newest write wins");
        assert_eq!(writer.pending(index), 0);
    }

    #[test]
    fn test_flush_waits_for_everything() {
        let memory = Arc::new(MemorySerializer::new());
        let writer = WriteBehindSerializer::new(memory.clone(), 2, 2).unwrap();
        for x in 0..32 {
            let index = ChunkIndex::new(x, 0);
            writer.try_serialize(index, &chunk(index, Voxel::AIR)).unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(memory.len(), 32);
    }

    #[test]
    fn test_shutdown_rejects_new_writes() {
        let writer = WriteBehindSerializer::new(Arc::new(MemorySerializer::new()), 1, 1).unwrap();
        writer.shutdown();
        writer.shutdown();
        assert!(!writer.is_running());
        let index = ChunkIndex::new(0, 0);
        assert_eq!(
            writer.try_serialize(index, &chunk(index, Voxel::AIR)),
            Err(TerrainError::WorkerUnavailable)
        );
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(WriteBehindSerializer::new(Arc::new(MemorySerializer::new()), 0, 4).is_err());
    }
}
