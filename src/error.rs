//! Error types for chronostore
//!
//! A single closed taxonomy shared by every storage backend. Backends
//! translate their native failures into these kinds at the call boundary;
//! nothing above the `Storage` trait ever observes a backend-native error.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for chronostore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Storage Contract Errors
    // -------------------------------------------------------------------------
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Mapped-file backend hit its pre-declared maximum map size mid-write
    #[error("storage capacity exhausted: {0}")]
    CapacityExhausted(String),

    // -------------------------------------------------------------------------
    // Backend Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("permission denied: {0}")]
    Permission(String),

    /// Transient backend failure (connection reset, throttling, timeout).
    /// Callers are expected to retry with backoff.
    #[error("retryable storage failure: {0}")]
    Retryable(String),

    #[error("unexpected storage failure: {0}")]
    Unexpected(String),

    // -------------------------------------------------------------------------
    // Version / Snapshot Protocol Errors
    // -------------------------------------------------------------------------
    #[error("snapshot name already exists: {0}")]
    SnapshotNameExists(String),

    #[error("version {version_id} of symbol '{symbol}' does not exist")]
    VersionNotFound { symbol: String, version_id: u64 },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    /// Buffer allocation failed (out of memory)
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    // -------------------------------------------------------------------------
    // I/O and Serialization Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether a caller should retry this operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Retryable(_))
    }

    /// Whether this is a normal miss rather than an infrastructure failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::KeyNotFound(_) | StoreError::VersionNotFound { .. }
        )
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
