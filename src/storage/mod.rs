//! Storage Module
//!
//! Backend-agnostic persistence of `Key -> Segment` objects.
//!
//! ## Responsibilities
//! - Uniform write/read/update/remove/key_exists/iteration contract
//! - Strict key-uniqueness and not-found invariants (strict backends)
//! - Translation of backend-native failures into the shared taxonomy
//!
//! ## Backends
//! - `lmdb`: single memory-mapped file, fixed pre-declared size, durable
//! - `s3`: networked bucket/prefix object store, relaxed write/update
//!   semantics (documented deviations)
//! - `memory`: process-local, strict, non-persistent
//!
//! Backends never leak their native error types; every operation maps
//! failures onto `StoreError` before returning.

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::key::{Key, KeyType};
use crate::segment::KeySegmentPair;

mod lmdb;
mod memory;
pub mod s3;

pub use lmdb::LmdbStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Options for read operations (reserved for future knobs)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOpts {}

/// Options for update operations
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOpts {
    /// Create the key when it does not exist instead of failing.
    /// Used by layers that keep mutable pointer records atop the store.
    pub upsert: bool,
}

/// Options for remove operations (reserved for future knobs)
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOpts {}

/// Backend-agnostic contract over Key -> Segment persistence.
///
/// All methods take `&self`; implementations handle their own locking and
/// support concurrent reads without external coordination. Conflicting
/// writes to the same key resolve to exactly one success.
pub trait Storage: Send + Sync {
    /// Persist a new object. Fails with `DuplicateKey` if the key already
    /// exists (the object-storage backend instead overwrites; see its
    /// module docs).
    fn write(&self, kv: KeySegmentPair) -> Result<()>;

    /// Read a stored object, returning an independently owned segment.
    /// Fails with `KeyNotFound` if absent.
    fn read(&self, key: &Key, opts: ReadOpts) -> Result<KeySegmentPair>;

    /// Replace an existing object. Fails with `KeyNotFound` if the key does
    /// not exist, unless `opts.upsert` is set (the object-storage backend
    /// always creates; see its module docs).
    fn update(&self, kv: KeySegmentPair, opts: UpdateOpts) -> Result<()>;

    /// Remove a stored object. Fails with `KeyNotFound` if absent.
    fn remove(&self, key: &Key, opts: RemoveOpts) -> Result<()>;

    /// Whether the key currently exists. Plain absence is `Ok(false)`;
    /// only infrastructure failures propagate as errors.
    fn key_exists(&self, key: &Key) -> Result<bool>;

    /// List keys of one key type, optionally restricted to ids starting
    /// with `prefix`. The returned set reflects the catalogue at call time.
    fn iter_type(&self, key_type: KeyType, prefix: Option<&str>) -> Result<Vec<Key>>;

    /// Human-readable backend name (logging/diagnostics)
    fn name(&self) -> &'static str;
}

/// Open the backend selected by `config`
pub fn open_storage(config: &BackendConfig) -> Result<Arc<dyn Storage>> {
    match config {
        BackendConfig::Lmdb(cfg) => Ok(Arc::new(LmdbStorage::open(cfg)?)),
        BackendConfig::S3(cfg) => Ok(Arc::new(S3Storage::open(cfg)?)),
        BackendConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}
