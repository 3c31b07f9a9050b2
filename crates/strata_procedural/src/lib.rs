//! # STRATA Procedural Generation
//!
//! Deterministic terrain synthesis and chunk lifecycle.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: same seed and chunk index, same chunk bytes
//! 2. **Chunked**: chunks are generated, stored and evicted independently
//! 3. **Recoverable**: unreadable stored chunks are regenerated, never fatal
//!
//! ## Core Components
//!
//! - `NoiseGenerator`: seeded multi-octave simplex noise
//! - `TerrainGenerator`: height-field chunk synthesis
//! - `ChunkSerializer`: storage contract, with memory, file and
//!   write-behind implementations
//! - `ChunkLoader`: deserialize-or-generate on load, serialize on unload
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_procedural::{ChunkLoader, MemorySerializer, TerrainGenerator};
//!
//! let generator = Arc::new(TerrainGenerator::from_config(&config)?);
//! let loader = ChunkLoader::new(generator, Arc::new(MemorySerializer::new()));
//! let loaded = loader.load(&mut store, ChunkIndex::new(0, 0))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk_persistence;
pub mod generator;
pub mod loader;
pub mod noise;
pub mod write_behind;

pub use chunk_persistence::{decode_chunk, encode_chunk, ChunkSerializer, FileSerializer, MemorySerializer};
pub use generator::TerrainGenerator;
pub use loader::{ChunkLoader, LoadSource, LoadedChunk};
pub use noise::{NoiseGenerator, NoiseParams, SimplexNoise};
pub use write_behind::WriteBehindSerializer;
