//! Version & Snapshot Module
//!
//! The versioning protocol layered on top of `Storage`, not a separate
//! physical store.
//!
//! ## Responsibilities
//! - Give every write of a symbol the next monotonic version id
//! - Record named snapshots pinning a frozen (symbol -> version) set
//! - Reference-counted retention: a version is live while it is a symbol's
//!   current version or pinned by any live snapshot; orphans are removed
//!
//! ## Persistent records (bincode payloads inside ordinary segments)
//! - One `VersionRef` key per symbol holding [`VersionRecord`]
//! - One `Snapshot` key per snapshot name holding [`SnapshotRecord`]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod store;

pub use store::VersionStore;

/// Per-symbol pointer record stored under the symbol's `VersionRef` key.
///
/// `next_version` only ever grows, so version ids are never reused even
/// after the symbol is deleted; the record outlives the symbol's data for
/// exactly that reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version id the next write of this symbol will receive
    pub next_version: u64,

    /// Current (latest non-deleted) version, `None` after delete_symbol
    pub current: Option<u64>,

    /// Wall-clock nanos of the last mutation of this record
    pub updated_ts: i64,
}

/// Snapshot record stored under the snapshot's name.
///
/// The pinned set is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Frozen symbol -> version mapping captured at creation time
    pub pinned: BTreeMap<String, u64>,

    /// Free-form caller metadata
    pub metadata: BTreeMap<String, String>,

    /// Wall-clock nanos of creation
    pub created_ts: i64,
}

/// Which version of a symbol a read resolves to
#[derive(Debug, Clone)]
pub enum AsOf {
    /// The symbol's current version
    Latest,

    /// A specific version id
    Version(u64),

    /// The version pinned by a named snapshot
    Snapshot(String),
}

/// One row of `list_versions` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub symbol: String,
    pub version_id: u64,

    /// Segment header timestamp recorded when the version was written
    pub created_ts: i64,

    /// Names of live snapshots pinning this version
    pub snapshots: Vec<String>,
}
