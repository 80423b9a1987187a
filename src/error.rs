//! Error types for BlockKV
//!
//! Provides a unified error type for all operations. A missing key is never
//! an error: lookups return `Ok(None)`.

use thiserror::Error;

use crate::storage::BlockId;

/// Result type alias using BlockKvError
pub type Result<T> = std::result::Result<T, BlockKvError>;

/// Unified error type for BlockKV operations
#[derive(Debug, Error)]
pub enum BlockKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    /// A single entry cannot be stored with the configured block size.
    #[error("Capacity exceeded: entry needs {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    /// A merge was attempted without checking `fits` first.
    #[error("Buffer overflow: merge needs {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Layout Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    #[error("Invalid block id: {0}")]
    InvalidBlock(BlockId),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BlockKvError {
    fn from(err: bincode::Error) -> Self {
        BlockKvError::Codec(err.to_string())
    }
}
