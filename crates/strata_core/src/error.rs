//! # Terrain Error Types
//!
//! All errors that can occur in the terrain engine.
//!
//! Lookup misses are not errors: they surface as `Option::None`.

use thiserror::Error;

use crate::chunk::ChunkIndex;

/// Errors that can occur in the terrain engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerrainError {
    /// A chunk was registered at an index that is already occupied.
    #[error("chunk {0} is already registered")]
    DuplicateChunk(ChunkIndex),

    /// Unsupported or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A coordinate fell outside the addressed grid.
    #[error("{axis} coordinate {value} out of range 0..{limit}")]
    OutOfRange {
        /// Axis name (`x`, `y` or `z`).
        axis: &'static str,
        /// The offending coordinate.
        value: i64,
        /// Exclusive upper bound for the axis.
        limit: i64,
    },

    /// An argument was malformed in a way not covered by `OutOfRange`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Encoding or writing a chunk failed.
    #[error("failed to serialize chunk: {0}")]
    Serialization(String),

    /// Persisted chunk data could not be decoded.
    #[error("corrupt chunk {index}: {reason}")]
    CorruptChunk {
        /// Index the data was stored under.
        index: ChunkIndex,
        /// What failed to validate.
        reason: String,
    },

    /// The background worker pool has been shut down.
    #[error("persistence workers are no longer running")]
    WorkerUnavailable,
}

/// Result type for terrain operations.
pub type TerrainResult<T> = Result<T, TerrainError>;

impl TerrainError {
    /// Builds a `Serialization` error from an I/O failure.
    #[must_use]
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Serialization(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_chunk() {
        let err = TerrainError::DuplicateChunk(ChunkIndex::new(3, -2));
        assert_eq!(err.to_string(), "chunk (3, -2) is already registered");

        let err = TerrainError::OutOfRange { axis: "z", value: 9, limit: 4 };
        assert_eq!(err.to_string(), "z coordinate 9 out of range 0..4");
    }
}
