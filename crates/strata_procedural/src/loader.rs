//! # Chunk Loader
//!
//! Drives a chunk between storage and the terrain store.
//!
//! - `load`: deserialize if stored, otherwise generate and serialize
//!   immediately, then register.
//! - `unload`: serialize the current state, then evict.
//!
//! Unreadable stored data is never fatal: the loader logs it and
//! regenerates, which is reproducible because generation is deterministic.

use std::sync::Arc;

use tracing::{debug, warn};

use strata_core::chunk::{Chunk, ChunkIndex};
use strata_core::error::{TerrainError, TerrainResult};
use strata_core::store::TerrainStore;

use crate::chunk_persistence::ChunkSerializer;
use crate::generator::TerrainGenerator;

/// Where a loaded chunk came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// Read back from the serializer.
    Deserialized,
    /// Synthesized from noise.
    Generated,
}

/// A chunk that has just been registered.
#[derive(Debug)]
pub struct LoadedChunk<'a> {
    /// The registered chunk.
    pub chunk: &'a Chunk,
    /// Where it came from.
    pub source: LoadSource,
}

/// Deserialize-or-generate loader.
pub struct ChunkLoader {
    generator: Arc<TerrainGenerator>,
    serializer: Arc<dyn ChunkSerializer>,
}

impl ChunkLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(generator: Arc<TerrainGenerator>, serializer: Arc<dyn ChunkSerializer>) -> Self {
        Self { generator, serializer }
    }

    /// The generator used on a storage miss.
    #[must_use]
    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// The storage backend.
    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn ChunkSerializer> {
        &self.serializer
    }

    /// Loads `index` into `store`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChunk` if `index` is already loaded. Storage
    /// failures are not errors; they fall back to generation.
    pub fn load<'s>(&self, store: &'s mut TerrainStore, index: ChunkIndex) -> TerrainResult<LoadedChunk<'s>> {
        if store.contains(index) {
            return Err(TerrainError::DuplicateChunk(index));
        }

        let (chunk, source) = match self.read_stored(store, index) {
            Some(chunk) => (chunk, LoadSource::Deserialized),
            None => {
                let chunk = self.generator.generate(index);
                if let Err(err) = self.serializer.try_serialize(index, &chunk) {
                    warn!("Chunk {} generated but not persisted: {}", index, err);
                }
                (chunk, LoadSource::Generated)
            }
        };

        store.add(index, chunk)?;
        debug!("Loaded chunk {} ({:?})", index, source);
        let chunk = store
            .try_get(index)
            .ok_or_else(|| TerrainError::InvalidArgument(format!("chunk {index} vanished after add")))?;
        Ok(LoadedChunk { chunk, source })
    }

    /// Loads `index` unless it is already loaded.
    ///
    /// Returns `None` when nothing had to be done.
    ///
    /// # Errors
    ///
    /// Propagates registration errors other than "already loaded".
    pub fn ensure_loaded(&self, store: &mut TerrainStore, index: ChunkIndex) -> TerrainResult<Option<LoadSource>> {
        if store.contains(index) {
            return Ok(None);
        }
        self.load(store, index).map(|loaded| Some(loaded.source))
    }

    /// Serializes and evicts `index`.
    ///
    /// Returns `None` when the chunk was not loaded. The chunk stays loaded
    /// if serialization fails, so no edit is lost.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error.
    pub fn unload(&self, store: &mut TerrainStore, index: ChunkIndex) -> TerrainResult<Option<Chunk>> {
        let Some(chunk) = store.try_get(index) else {
            return Ok(None);
        };
        self.serializer.try_serialize(index, chunk)?;
        debug!("Unloaded chunk {}", index);
        Ok(store.remove(index))
    }

    fn read_stored(&self, store: &TerrainStore, index: ChunkIndex) -> Option<Chunk> {
        match self.serializer.try_deserialize(index) {
            Ok(Some(chunk)) if chunk.dimensions() == store.dimensions() => Some(chunk),
            Ok(Some(_)) => {
                warn!("Stored chunk {} has foreign dimensions, regenerating", index);
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Failed to read chunk {}, regenerating: {}", index, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_persistence::MemorySerializer;
    use crate::noise::{NoiseGenerator, NoiseParams};
    use strata_core::chunk::{ChunkDimensions, ChunkUsage};
    use strata_core::config::SurfaceConfig;
    use strata_core::voxel::DENSITY_MAX;

    fn setup() -> (ChunkLoader, Arc<MemorySerializer>, TerrainStore) {
        let dims = ChunkDimensions::new(4, 4, 1).unwrap();
        let noise = NoiseGenerator::new(NoiseParams {
            seed: 42,
            octaves: 3,
            base_frequency: 0.1,
            persistence: 0.5,
        })
        .unwrap();
        let generator = Arc::new(TerrainGenerator::new(noise, dims, ChunkUsage::BOTH, SurfaceConfig::default()));
        let memory = Arc::new(MemorySerializer::new());
        (ChunkLoader::new(generator, memory.clone()), memory, TerrainStore::new(dims))
    }

    #[test]
    fn test_first_load_generates_and_persists() {
        let (loader, memory, mut store) = setup();
        let index = ChunkIndex::new(0, 0);
        let loaded = loader.load(&mut store, index).unwrap();
        assert_eq!(loaded.source, LoadSource::Generated);
        assert!(memory.contains(index), "generated chunks are serialized immediately");
        assert!(store.contains(index));
    }

    #[test]
    fn test_reload_deserializes_edits() {
        let (loader, _memory, mut store) = setup();
        let index = ChunkIndex::new(0, -1);
        loader.load(&mut store, index).unwrap();
        store.try_get_mut(index).unwrap().raise_column(3, 3, DENSITY_MAX).unwrap();
        let edited = store.try_get(index).unwrap().voxels().to_vec();

        let evicted = loader.unload(&mut store, index).unwrap();
        assert!(evicted.is_some());
        assert!(!store.contains(index));

        let loaded = loader.load(&mut store, index).unwrap();
        assert_eq!(loaded.source, LoadSource::Deserialized);
        assert_eq!(loaded.chunk.voxels(), &edited[..]);
    }

    #[test]
    fn test_corrupt_data_falls_back_to_generation() {
        let (loader, memory, mut store) = setup();
        let index = ChunkIndex::new(2, 0);
        memory.store_raw(index, b"not a chunk".to_vec());

        let loaded = loader.load(&mut store, index).unwrap();
        assert_eq!(loaded.source, LoadSource::Generated);
        let expected = loader.generator().generate(index);
        assert_eq!(store.try_get(index).unwrap().as_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_duplicate_and_missing() {
        let (loader, _memory, mut store) = setup();
        let index = ChunkIndex::new(1, 1);
        assert_eq!(loader.ensure_loaded(&mut store, index).unwrap(), Some(LoadSource::Generated));
        assert_eq!(loader.ensure_loaded(&mut store, index).unwrap(), None);
        assert!(matches!(loader.load(&mut store, index), Err(TerrainError::DuplicateChunk(_))));
        assert!(loader.unload(&mut store, ChunkIndex::new(5, 5)).unwrap().is_none());
    }
}
