//! Configuration for chronostore backends
//!
//! One config struct per backend, selected through `BackendConfig`.
//! Each struct carries sensible defaults and a self-consuming builder.

use std::path::PathBuf;

/// Selects and configures one concrete storage backend
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Local memory-mapped file environment
    Lmdb(LmdbConfig),

    /// Networked object storage (bucket/prefix model)
    S3(S3Config),

    /// Process-local, non-persistent store (testing, scratch libraries)
    Memory,
}

/// Configuration for the mapped-file backend
#[derive(Debug, Clone)]
pub struct LmdbConfig {
    /// Path of the single data file
    pub path: PathBuf,

    /// Pre-declared maximum size of the mapped environment (bytes).
    /// Writes that would exceed this fail with `CapacityExhausted`.
    pub map_size: u64,

    /// Truncate any prior contents at `path` when opening
    pub recreate_if_exists: bool,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./chronostore.dat"),
            map_size: 128 * 1024 * 1024, // 128 MB
            recreate_if_exists: false,
        }
    }
}

impl LmdbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the maximum map size (in bytes)
    pub fn map_size(mut self, size: u64) -> Self {
        self.map_size = size;
        self
    }

    /// Truncate existing contents on open
    pub fn recreate_if_exists(mut self, recreate: bool) -> Self {
        self.recreate_if_exists = recreate;
        self
    }
}

/// Configuration for the object-storage backend
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,

    /// Object name prefix (library root within the bucket)
    pub prefix: String,

    /// Region hint for the transport
    pub region: String,

    /// Substitute the scripted in-process mock transport (testing only)
    pub use_mock_storage_for_testing: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "chronostore".to_string(),
            prefix: "lib".to_string(),
            region: "us-east-1".to_string(),
            use_mock_storage_for_testing: false,
        }
    }
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Set the region hint
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Route all operations through the scripted mock transport
    pub fn use_mock_storage_for_testing(mut self, enabled: bool) -> Self {
        self.use_mock_storage_for_testing = enabled;
        self
    }
}
