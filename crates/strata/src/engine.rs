//! # Terrain Engine
//!
//! The explicitly constructed context that owns a terrain world.
//!
//! ```text
//! BoundsProvider ──> update_active_region ──> ChunkLoader ──> TerrainStore
//!                                                │                 │
//!                       WriteBehindSerializer <──┘                 │
//! JobScheduler ──> run_pending_jobs ──> TerrainMutator ────────────┤
//!                                                                  │
//! MeshSink <── rebuild_dirty_meshes <── ChunkMesher <──────────────┘
//! ```
//!
//! Every mutating method takes `&mut self`, so an extraction always sees a
//! chunk either fully before or fully after an edit.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use strata_core::chunk::{ChunkDimensions, ChunkIndex};
use strata_core::config::TerrainConfig;
use strata_core::error::TerrainResult;
use strata_core::store::TerrainStore;
use strata_meshing::{mesher_for, ChunkMesher, MeshSink};
use strata_procedural::{
    ChunkLoader, ChunkSerializer, FileSerializer, LoadSource, MemorySerializer, TerrainGenerator,
    WriteBehindSerializer,
};

use crate::bounds::{union_of, BoundsProvider};
use crate::jobs::{JobId, JobScheduler, TerrainJob};
use crate::mutator::TerrainMutator;

/// Engine counters for the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Chunks synthesized from noise.
    pub chunks_generated: u64,
    /// Chunks read back from storage.
    pub chunks_deserialized: u64,
    /// Chunks written by unload or save.
    pub chunks_saved: u64,
    /// Chunks evicted.
    pub chunks_unloaded: u64,
    /// `set_mesh` calls issued.
    pub meshes_built: u64,
    /// `remove_mesh` calls issued.
    pub meshes_removed: u64,
    /// Jobs admitted by the scheduler.
    pub jobs_admitted: u64,
    /// Jobs the scheduler turned away.
    pub jobs_skipped: u64,
    /// Jobs applied.
    pub jobs_completed: u64,
}

/// Outcome of [`TerrainEngine::update_active_region`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionUpdate {
    /// Newly loaded chunks.
    pub loaded: Vec<ChunkIndex>,
    /// Evicted chunks.
    pub unloaded: Vec<ChunkIndex>,
}

/// A terrain world: storage, streaming, editing and meshing.
pub struct TerrainEngine {
    config: TerrainConfig,
    store: TerrainStore,
    loader: ChunkLoader,
    write_behind: Arc<WriteBehindSerializer>,
    mesher: Box<dyn ChunkMesher + Send>,
    scheduler: Arc<JobScheduler>,
    /// Chunks the mesh sink currently holds a mesh for.
    meshed: HashSet<ChunkIndex>,
    /// Meshes of unloaded chunks, removed on the next rebuild.
    stale_meshes: Vec<ChunkIndex>,
    stats: EngineStats,
    closed: bool,
}

impl TerrainEngine {
    /// Creates an engine.
    ///
    /// Chunks are stored in `persistence.directory` when set, in memory
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an invalid configuration and
    /// `Serialization` when the chunk directory cannot be created.
    pub fn new(config: TerrainConfig) -> TerrainResult<Self> {
        config.validate()?;
        let backend: Arc<dyn ChunkSerializer> = match &config.persistence.directory {
            Some(directory) => Arc::new(FileSerializer::open(directory)?),
            None => Arc::new(MemorySerializer::new()),
        };
        Self::with_serializer(config, backend)
    }

    /// Creates an engine on top of a custom storage backend.
    ///
    /// Writes to `backend` go through the write-behind worker pool.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an invalid configuration.
    pub fn with_serializer(config: TerrainConfig, backend: Arc<dyn ChunkSerializer>) -> TerrainResult<Self> {
        config.validate()?;
        let dims = config.dimensions()?;
        let generator = Arc::new(TerrainGenerator::from_config(&config)?);
        let write_behind = Arc::new(WriteBehindSerializer::new(
            backend,
            config.persistence.workers,
            config.persistence.queue_capacity,
        )?);
        let serializer: Arc<dyn ChunkSerializer> = write_behind.clone();

        info!(
            width = dims.width(),
            height = dims.height(),
            depth = dims.depth(),
            seed = config.noise.seed,
            strategy = ?config.meshing.strategy,
            "Terrain engine created"
        );

        Ok(Self {
            store: TerrainStore::new(dims),
            loader: ChunkLoader::new(generator, serializer),
            write_behind,
            mesher: mesher_for(&config.meshing),
            scheduler: Arc::new(JobScheduler::new(dims, config.persistence.queue_capacity)),
            meshed: HashSet::new(),
            stale_meshes: Vec::new(),
            stats: EngineStats::default(),
            closed: false,
            config,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Chunk extents.
    #[must_use]
    pub fn dimensions(&self) -> ChunkDimensions {
        self.store.dimensions()
    }

    /// Loaded chunks.
    #[must_use]
    pub fn store(&self) -> &TerrainStore {
        &self.store
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let jobs = self.scheduler.stats();
        EngineStats {
            jobs_admitted: jobs.admitted,
            jobs_skipped: jobs.skipped,
            jobs_completed: jobs.completed,
            ..self.stats
        }
    }

    /// Chunks whose mesh the sink currently holds.
    #[must_use]
    pub fn meshed_chunks(&self) -> BTreeSet<ChunkIndex> {
        self.meshed.iter().copied().collect()
    }

    // ========================================================================
    // STREAMING
    // ========================================================================

    /// Loads `index`, from storage or by generating it.
    ///
    /// Returns `None` when it was already loaded. Loaded neighbors are
    /// flagged for rebuild since their border now reads real data.
    ///
    /// # Errors
    ///
    /// Propagates registration errors.
    pub fn load_chunk(&mut self, index: ChunkIndex) -> TerrainResult<Option<LoadSource>> {
        let Some(source) = self.loader.ensure_loaded(&mut self.store, index)? else {
            return Ok(None);
        };
        match source {
            LoadSource::Generated => self.stats.chunks_generated += 1,
            LoadSource::Deserialized => self.stats.chunks_deserialized += 1,
        }
        self.flag_neighbors(index);
        Ok(Some(source))
    }

    /// Saves and evicts `index`.
    ///
    /// Returns false when it was not loaded. Its mesh is removed from the
    /// sink on the next rebuild.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error; the chunk then stays loaded.
    pub fn unload_chunk(&mut self, index: ChunkIndex) -> TerrainResult<bool> {
        if self.loader.unload(&mut self.store, index)?.is_none() {
            return Ok(false);
        }
        self.stats.chunks_saved += 1;
        self.stats.chunks_unloaded += 1;
        if self.meshed.remove(&index) {
            self.stale_meshes.push(index);
        }
        self.flag_neighbors(index);
        Ok(true)
    }

    /// Loads every chunk in the union of the provider's bounds and unloads
    /// every loaded chunk outside it.
    ///
    /// # Errors
    ///
    /// Stops at the first load or unload error.
    pub fn update_active_region(&mut self, provider: &dyn BoundsProvider) -> TerrainResult<RegionUpdate> {
        let wanted = union_of(&provider.active_bounds());
        let mut update = RegionUpdate::default();

        for index in self.store.indices() {
            if !wanted.contains(&index) && self.unload_chunk(index)? {
                update.unloaded.push(index);
            }
        }
        for &index in &wanted {
            if self.load_chunk(index)?.is_some() {
                update.loaded.push(index);
            }
        }

        debug!(
            loaded = update.loaded.len(),
            unloaded = update.unloaded.len(),
            active = self.store.len(),
            "Active region updated"
        );
        Ok(update)
    }

    /// Saves every loaded chunk without evicting it, then waits for storage.
    ///
    /// # Errors
    ///
    /// Returns the first serializer error.
    pub fn save_all(&mut self) -> TerrainResult<usize> {
        let serializer = self.loader.serializer();
        let mut saved = 0;
        for (index, chunk) in self.store.iter() {
            serializer.try_serialize(index, chunk)?;
            saved += 1;
        }
        serializer.flush()?;
        self.stats.chunks_saved += saved as u64;
        Ok(saved)
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Starts a batch of direct edits.
    pub fn mutator(&mut self) -> TerrainMutator<'_> {
        TerrainMutator::new(&mut self.store)
    }

    /// Digs a disk and returns the affected chunks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-finite origin or a negative
    /// radius.
    pub fn dig_circle(&mut self, origin: [f32; 2], radius: f32) -> TerrainResult<Vec<ChunkIndex>> {
        let mut mutator = self.mutator();
        mutator.dig_circle(origin, radius)?;
        Ok(mutator.finish())
    }

    /// Shared handle to the job scheduler, for producers on other threads.
    #[must_use]
    pub fn scheduler(&self) -> Arc<JobScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Submits a job; `None` when it was not admitted.
    pub fn schedule(&self, job: TerrainJob) -> Option<JobId> {
        self.scheduler.schedule(job)
    }

    /// Applies every admitted job in admission order and returns the
    /// affected chunks.
    ///
    /// # Errors
    ///
    /// Returns the first job error. Its reservations are released first.
    pub fn run_pending_jobs(&mut self) -> TerrainResult<Vec<ChunkIndex>> {
        let mut affected = BTreeSet::new();
        while let Some(scheduled) = self.scheduler.take_next() {
            let mut mutator = TerrainMutator::new(&mut self.store);
            let result = scheduled.job.apply(&mut mutator);
            affected.extend(mutator.finish());
            self.scheduler.complete(&scheduled);
            result?;
        }
        Ok(affected.into_iter().collect())
    }

    // ========================================================================
    // MESHING
    // ========================================================================

    /// Re-meshes every chunk flagged for rebuild and hands the results to
    /// `sink`.
    ///
    /// Empty results and chunks that stopped rendering have their previous
    /// mesh removed. Returns the number of chunks re-meshed.
    pub fn rebuild_dirty_meshes(&mut self, sink: &mut dyn MeshSink) -> usize {
        for index in std::mem::take(&mut self.stale_meshes) {
            sink.remove_mesh(index);
            self.stats.meshes_removed += 1;
        }

        let mut rebuilt = 0;
        for index in self.store.dirty_indices() {
            let renders = self.store.try_get(index).is_some_and(|chunk| chunk.usage().needs_mesh());
            let mesh = if renders {
                self.mesher.mesh_chunk(&self.store, index)
            } else {
                None
            };

            match mesh {
                Some(mesh) if !mesh.is_empty() => {
                    sink.set_mesh(index, mesh);
                    self.meshed.insert(index);
                    self.stats.meshes_built += 1;
                }
                _ => {
                    if self.meshed.remove(&index) {
                        sink.remove_mesh(index);
                        self.stats.meshes_removed += 1;
                    }
                }
            }
            if let Some(chunk) = self.store.try_get_mut(index) {
                chunk.clear_rebuild_required();
            }
            rebuilt += 1;
        }
        rebuilt
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Waits until every accepted chunk write is durable.
    ///
    /// # Errors
    ///
    /// Returns the first write error since the last flush.
    pub fn flush(&self) -> TerrainResult<()> {
        self.loader.serializer().flush()
    }

    /// Saves and evicts every chunk, drains storage and stops the workers.
    ///
    /// # Errors
    ///
    /// Returns the first unload or write error; shutdown still completes.
    pub fn shutdown(mut self) -> TerrainResult<()> {
        self.close()
    }

    fn close(&mut self) -> TerrainResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        for index in self.store.indices() {
            if let Err(err) = self.unload_chunk(index) {
                warn!("Chunk {} could not be saved at shutdown: {}", index, err);
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.flush() {
            first_error.get_or_insert(err);
        }
        self.write_behind.shutdown();
        info!(stats = ?self.stats(), "Terrain engine shut down");
        first_error.map_or(Ok(()), Err)
    }

    fn flag_neighbors(&mut self, index: ChunkIndex) {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if let Some(chunk) = self.store.try_get_mut(index.offset(dx, dy)) {
                    chunk.mark_rebuild_required();
                }
            }
        }
    }
}

impl Drop for TerrainEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Terrain engine dropped with unsaved chunks: {}", err);
        }
    }
}
