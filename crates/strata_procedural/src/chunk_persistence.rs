//! # Chunk Persistence
//!
//! The serializer contract plus the on-disk chunk format.
//!
//! ## Format
//!
//! ```text
//! offset  size  field
//! 0       4     magic "STRC"
//! 4       1     format version
//! 5       3     log2 width, height, depth
//! 8       8     chunk index x, y (i32 LE)
//! 16      1     usage bits
//! 17      4     CRC32 of the raw voxel bytes (LE)
//! 21      ..    LZ4 block, size-prepended
//! ```
//!
//! Any mismatch on decode is reported as `CorruptChunk`; callers fall back
//! to generation instead of loading damaged data.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use parking_lot::RwLock;
use tracing::debug;

use strata_core::chunk::{Chunk, ChunkDimensions, ChunkIndex, ChunkUsage};
use strata_core::error::{TerrainError, TerrainResult};
use strata_core::voxel::Voxel;

/// Chunk file magic.
pub const MAGIC: [u8; 4] = *b"STRC";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 21;

/// Storage backend for chunks, keyed by chunk index.
///
/// Implementations must be idempotent per index: serializing the same chunk
/// twice leaves the same stored state, and a later deserialize returns the
/// most recent serialize for that index.
pub trait ChunkSerializer: Send + Sync {
    /// Persists `chunk` under `index`.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the write fails.
    fn try_serialize(&self, index: ChunkIndex, chunk: &Chunk) -> TerrainResult<()>;

    /// Reads the chunk stored under `index`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `CorruptChunk` for data that fails validation and
    /// `Serialization` when the read itself fails.
    fn try_deserialize(&self, index: ChunkIndex) -> TerrainResult<Option<Chunk>>;

    /// Blocks until every accepted write is durable.
    ///
    /// # Errors
    ///
    /// Returns the first write error encountered, if the backend tracks them.
    fn flush(&self) -> TerrainResult<()> {
        Ok(())
    }
}

/// Encodes a chunk into the binary format.
#[must_use]
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let dims = chunk.dimensions();
    let index = chunk.index();
    let raw = chunk.as_bytes();
    let body = compress_prepend_size(raw);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.push(dims.log_width() as u8);
    out.push(dims.log_height() as u8);
    out.push(dims.log_depth() as u8);
    out.extend_from_slice(&index.x.to_le_bytes());
    out.extend_from_slice(&index.y.to_le_bytes());
    out.push(chunk.usage().bits());
    out.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decodes a chunk stored under `index`.
///
/// # Errors
///
/// Returns `CorruptChunk` when the header, index, length or checksum does
/// not validate.
pub fn decode_chunk(index: ChunkIndex, data: &[u8]) -> TerrainResult<Chunk> {
    let corrupt = |reason: String| TerrainError::CorruptChunk { index, reason };

    if data.len() < HEADER_LEN {
        return Err(corrupt(format!("{} bytes is shorter than the header", data.len())));
    }
    if data[0..4] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    if data[4] != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", data[4])));
    }

    let dims = ChunkDimensions::new(u32::from(data[5]), u32::from(data[6]), u32::from(data[7]))
        .map_err(|e| corrupt(e.to_string()))?;
    let stored = ChunkIndex::new(read_i32(&data[8..12]), read_i32(&data[12..16]));
    if stored != index {
        return Err(corrupt(format!("data belongs to chunk {stored}")));
    }
    let usage = ChunkUsage::from_bits(data[16]);
    let checksum = u32::from_le_bytes([data[17], data[18], data[19], data[20]]);

    // The size prefix is checked before it sizes the output buffer.
    let body = &data[HEADER_LEN..];
    let expected = dims.volume() * std::mem::size_of::<Voxel>();
    let declared = match body {
        [a, b, c, d, ..] => u32::from_le_bytes([*a, *b, *c, *d]) as usize,
        _ => return Err(corrupt("missing size prefix".into())),
    };
    if declared != expected {
        return Err(corrupt(format!("expected {expected} voxel bytes, header declares {declared}")));
    }
    let raw = decompress_size_prepended(body).map_err(|e| corrupt(e.to_string()))?;
    if raw.len() != expected {
        return Err(corrupt(format!("expected {expected} voxel bytes, got {}", raw.len())));
    }
    if crc32fast::hash(&raw) != checksum {
        return Err(corrupt("checksum mismatch".into()));
    }

    let voxels = raw
        .chunks_exact(std::mem::size_of::<Voxel>())
        .map(bytemuck::pod_read_unaligned::<Voxel>)
        .collect();
    Chunk::from_voxels(index, dims, voxels, usage)
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    i32::from_le_bytes(buf)
}

/// Keeps encoded chunks in memory.
#[derive(Default)]
pub struct MemorySerializer {
    entries: RwLock<HashMap<ChunkIndex, Vec<u8>>>,
}

impl MemorySerializer {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under `index`, bypassing the encoder.
    pub fn store_raw(&self, index: ChunkIndex, bytes: Vec<u8>) {
        self.entries.write().insert(index, bytes);
    }

    /// Raw bytes stored under `index`.
    #[must_use]
    pub fn raw(&self, index: ChunkIndex) -> Option<Vec<u8>> {
        self.entries.read().get(&index).cloned()
    }

    /// True when something is stored under `index`.
    #[must_use]
    pub fn contains(&self, index: ChunkIndex) -> bool {
        self.entries.read().contains_key(&index)
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ChunkSerializer for MemorySerializer {
    fn try_serialize(&self, index: ChunkIndex, chunk: &Chunk) -> TerrainResult<()> {
        let bytes = encode_chunk(chunk);
        self.entries.write().insert(index, bytes);
        Ok(())
    }

    fn try_deserialize(&self, index: ChunkIndex) -> TerrainResult<Option<Chunk>> {
        match self.entries.read().get(&index) {
            Some(bytes) => decode_chunk(index, bytes).map(Some),
            None => Ok(None),
        }
    }
}

/// One file per chunk in a directory.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// sees either the previous file or the complete new one.
pub struct FileSerializer {
    directory: PathBuf,
}

impl FileSerializer {
    /// Opens (and creates if needed) a chunk directory.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the directory cannot be created.
    pub fn open(directory: impl Into<PathBuf>) -> TerrainResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .map_err(|e| TerrainError::io(&format!("creating {}", directory.display()), &e))?;
        debug!("Chunk directory {}", directory.display());
        Ok(Self { directory })
    }

    /// Directory holding the chunk files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File path for a chunk index.
    #[must_use]
    pub fn chunk_path(&self, index: ChunkIndex) -> PathBuf {
        self.directory.join(format!("chunk_{}_{}.strc", index.x, index.y))
    }
}

impl ChunkSerializer for FileSerializer {
    fn try_serialize(&self, index: ChunkIndex, chunk: &Chunk) -> TerrainResult<()> {
        let path = self.chunk_path(index);
        let tmp = path.with_extension("strc.tmp");
        fs::write(&tmp, encode_chunk(chunk))
            .map_err(|e| TerrainError::io(&format!("writing {}", tmp.display()), &e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| TerrainError::io(&format!("renaming {}", tmp.display()), &e))
    }

    fn try_deserialize(&self, index: ChunkIndex) -> TerrainResult<Option<Chunk>> {
        let path = self.chunk_path(index);
        match fs::read(&path) {
            Ok(bytes) => decode_chunk(index, &bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TerrainError::io(&format!("reading {}", path.display()), &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::voxel::{Color15, Material};

    fn sample_chunk(index: ChunkIndex) -> Chunk {
        let dims = ChunkDimensions::new(3, 2, 1).unwrap();
        let mut chunk = Chunk::new(index, dims, Voxel::solid(Material::Rock), ChunkUsage::RENDERING);
        let mut tinted = Voxel::with_density(Material::Clay, 5);
        tinted.color = Color15::new(3, 9, 27).raw();
        chunk.set_voxel(2, 1, 1, tinted).unwrap();
        chunk.set_voxel(7, 3, 0, Voxel::AIR).unwrap();
        chunk
    }

    #[test]
    fn test_codec_preserves_voxels() {
        let index = ChunkIndex::new(-4, 9);
        let chunk = sample_chunk(index);
        let decoded = decode_chunk(index, &encode_chunk(&chunk)).unwrap();
        assert_eq!(decoded.voxels(), chunk.voxels());
        assert_eq!(decoded.usage(), ChunkUsage::RENDERING);
        assert_eq!(decoded.dimensions(), chunk.dimensions());
    }

    #[test]
    fn test_decode_rejects_damage() {
        let index = ChunkIndex::new(1, 1);
        let bytes = encode_chunk(&sample_chunk(index));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        let mut bad_crc = bytes.clone();
        bad_crc[17] ^= 0xFF;
        let truncated = bytes[..HEADER_LEN + 2].to_vec();

        for damaged in [bad_magic, bad_crc, truncated, vec![1, 2, 3]] {
            assert!(
                matches!(decode_chunk(index, &damaged), Err(TerrainError::CorruptChunk { .. })),
                "damaged data must not decode"
            );
        }
        assert!(decode_chunk(ChunkIndex::new(2, 1), &bytes).is_err(), "index is checked");
    }

    #[test]
    fn test_decode_rejects_wrong_size_prefix() {
        let index = ChunkIndex::new(1, 1);
        let bytes = encode_chunk(&sample_chunk(index));

        let mut huge = bytes.clone();
        huge[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        match decode_chunk(index, &huge) {
            Err(TerrainError::CorruptChunk { reason, .. }) => assert!(reason.contains("declares"), "{reason}"),
            other => panic!("expected CorruptChunk, got {other:?}"),
        }

        let no_prefix = bytes[..HEADER_LEN + 3].to_vec();
        assert!(matches!(decode_chunk(index, &no_prefix), Err(TerrainError::CorruptChunk { .. })));
    }

    #[test]
    fn test_memory_serializer() {
        let serializer = MemorySerializer::new();
        let index = ChunkIndex::new(0, -1);
        assert!(serializer.try_deserialize(index).unwrap().is_none());

        let chunk = sample_chunk(index);
        serializer.try_serialize(index, &chunk).unwrap();
        serializer.try_serialize(index, &chunk).unwrap();
        assert_eq!(serializer.len(), 1);
        let loaded = serializer.try_deserialize(index).unwrap().unwrap();
        assert_eq!(loaded.voxels(), chunk.voxels());
    }

    #[test]
    fn test_file_serializer() {
        let dir = std::env::temp_dir().join(format!("strata_file_serializer_{}", std::process::id()));
        let serializer = FileSerializer::open(&dir).unwrap();
        let index = ChunkIndex::new(-2, 3);

        assert!(serializer.try_deserialize(index).unwrap().is_none());
        let chunk = sample_chunk(index);
        serializer.try_serialize(index, &chunk).unwrap();
        assert!(serializer.chunk_path(index).exists());
        assert!(!serializer.chunk_path(index).with_extension("strc.tmp").exists());

        let loaded = serializer.try_deserialize(index).unwrap().unwrap();
        assert_eq!(loaded.voxels(), chunk.voxels());

        fs::write(serializer.chunk_path(index), b"garbage").unwrap();
        assert!(matches!(
            serializer.try_deserialize(index),
            Err(TerrainError::CorruptChunk { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
