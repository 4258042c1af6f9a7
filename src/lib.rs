//! # chronostore
//!
//! The persistence core of a columnar time-series database:
//! - Key-addressed object storage with interchangeable backends
//!   (memory-mapped file, networked object storage, in-memory)
//! - A shared error taxonomy every backend translates into
//! - A version & snapshot protocol giving every write a version number and
//!   letting named snapshots pin versions against deletion
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Version & Snapshot Protocol                  │
//! │        (version refs, snapshots, retention/liveness)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Storage (trait)                           │
//! │     write / read / update / remove / key_exists / iter       │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Mapped File │   │   Object    │   │  In-Memory  │
//! │  (memmap)   │   │   Storage   │   │  (BTreeMap) │
//! └─────────────┘   └─────────────┘   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod segment;
pub mod buffer;
pub mod storage;
pub mod version;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{BackendConfig, LmdbConfig, S3Config};
pub use key::{Key, KeyType};
pub use segment::{KeySegmentPair, Segment, SegmentHeader};
pub use buffer::{BufferHolder, ColumnBuffer, DataType, Dimension, Sparsity, TypeDescriptor};
pub use storage::{open_storage, ReadOpts, RemoveOpts, Storage, UpdateOpts};
pub use version::{AsOf, VersionInfo, VersionStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chronostore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
