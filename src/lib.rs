//! # BlockKV
//!
//! A disk-backed key-value storage library with:
//! - Explicit, order-preserving byte codecs for keys and values
//! - Sorted fixed-size blocks searched without decoding
//! - An on-disk B+Tree with split, merge and linked-leaf range scans
//! - A bounded LRU write-back cache with pluggable load and persist hooks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CachedTree / WriteBackCache                 │
//! │                  (values, write-back LRU)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ miss / eviction
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        BPlusTree                            │
//! │             (descent, split, merge, iteration)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Node Cache  │          │ SortedBlock │
//!   │ (LRU nodes) │          │  (layout)   │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ BlockStore  │
//!   │ (file/mem)  │
//!   └─────────────┘
//! ```
//!
//! Everything is single-threaded and synchronous; durability is up to the
//! last completed `save()`.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod block;
pub mod storage;
pub mod cache;
pub mod tree;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlockKvError, Result};
pub use config::{TreeConfig, TreeConfigBuilder, ValueStorage};

pub use block::{PointerWidth, SortedBlock};
pub use cache::{Capacity, WriteBackCache};
pub use codec::{Bincoded, Codec};
pub use storage::{BlockId, BlockStore, FileBlockStore, MemoryBlockStore};
pub use tree::{BPlusTree, CachedTree, TreeIndex};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BlockKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
