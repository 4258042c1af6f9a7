//! VersionStore implementation
//!
//! Coordinates the version/snapshot protocol over one `Storage` backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::key::{Key, KeyType};
use crate::segment::{KeySegmentPair, Segment, SegmentHeader};
use crate::storage::{ReadOpts, RemoveOpts, Storage, UpdateOpts};

use super::{AsOf, SnapshotRecord, VersionInfo, VersionRecord};

/// Versioning and snapshot protocol over a storage backend.
///
/// ## Concurrency Model
/// All mutating protocol operations (write_symbol, delete_symbol, snapshot,
/// delete_snapshot) are serialized by `write_lock`. That single lock is the
/// chosen serialization strategy for retention: a snapshot created while a
/// deletion is recomputing liveness cannot interleave with the physical
/// removal step. Reads take no protocol-level lock. The guarantee covers
/// one process; cross-process writers need external coordination.
pub struct VersionStore {
    /// Backend holding every protocol record and all version data
    storage: Arc<dyn Storage>,

    /// Serializes mutating protocol operations
    write_lock: Mutex<()>,
}

impl VersionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    // =========================================================================
    // Symbol Operations
    // =========================================================================

    /// Write a new version of `symbol` and return its version id.
    ///
    /// Steps:
    /// 1. Acquire the write lock
    /// 2. Allocate the next version id from the symbol's ref record
    /// 3. Persist the version key with the caller's segment
    /// 4. Advance the ref record (next_version, current)
    pub fn write_symbol(&self, symbol: &str, segment: Segment) -> Result<u64> {
        let _guard = self.write_lock.lock();

        let mut rec = self.read_ref(symbol)?.unwrap_or(VersionRecord {
            next_version: 0,
            current: None,
            updated_ts: 0,
        });
        let version_id = rec.next_version;

        let key = version_key(symbol, version_id)?;
        self.storage.write(KeySegmentPair::new(key, segment))?;

        rec.next_version = version_id + 1;
        rec.current = Some(version_id);
        rec.updated_ts = now_nanos();
        self.persist_ref(symbol, &rec)?;

        tracing::debug!(symbol, version_id, "wrote symbol version");
        Ok(version_id)
    }

    /// Read a symbol at a version resolved by `as_of`.
    ///
    /// Snapshot resolution uses the version pinned at snapshot-creation
    /// time, so it works after the symbol was deleted or superseded as long
    /// as the snapshot lives.
    pub fn read_symbol(&self, symbol: &str, as_of: AsOf) -> Result<KeySegmentPair> {
        let version_id = match as_of {
            AsOf::Latest => self
                .read_ref(symbol)?
                .and_then(|rec| rec.current)
                .ok_or_else(|| StoreError::KeyNotFound(symbol.to_string()))?,
            AsOf::Version(v) => v,
            AsOf::Snapshot(name) => {
                let rec = self.read_snapshot(&name)?;
                *rec.pinned.get(symbol).ok_or_else(|| {
                    StoreError::KeyNotFound(format!("{symbol} in snapshot {name}"))
                })?
            }
        };

        self.storage
            .read(&version_key(symbol, version_id)?, ReadOpts::default())
    }

    /// Clear the symbol's current-version pointer and physically remove
    /// every version of it not pinned by a live snapshot.
    ///
    /// The ref record itself survives so version ids stay monotonic.
    pub fn delete_symbol(&self, symbol: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut rec = self
            .read_ref(symbol)?
            .filter(|rec| rec.current.is_some())
            .ok_or_else(|| StoreError::KeyNotFound(symbol.to_string()))?;

        // Step 1: drop the current-version pointer
        rec.current = None;
        rec.updated_ts = now_nanos();
        self.persist_ref(symbol, &rec)?;

        // Step 2: remove versions no snapshot pins
        let pinned = self.pinned_versions_of(symbol, None)?;
        let mut removed = 0usize;
        for key in self.storage.iter_type(KeyType::Version, Some(symbol))? {
            if key.id == symbol && !pinned.contains(&key.version_id) {
                self.storage.remove(&key, RemoveOpts::default())?;
                removed += 1;
            }
        }

        tracing::debug!(symbol, removed, "deleted symbol");
        Ok(())
    }

    /// Symbols that currently have a live version
    pub fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        for key in self.storage.iter_type(KeyType::VersionRef, None)? {
            if let Some(rec) = self.read_ref(&key.id)? {
                if rec.current.is_some() {
                    symbols.push(key.id);
                }
            }
        }
        Ok(symbols)
    }

    // =========================================================================
    // Snapshot Operations
    // =========================================================================

    /// Create a named snapshot.
    ///
    /// The pinned set defaults to every symbol's current version; symbols
    /// in `skip` are excluded and `overrides` substitutes explicit version
    /// ids (which must exist). Fails with `SnapshotNameExists` before any
    /// state is mutated when the name is already live.
    pub fn snapshot(
        &self,
        name: &str,
        metadata: BTreeMap<String, String>,
        overrides: BTreeMap<String, u64>,
        skip: &[String],
    ) -> Result<()> {
        let key = snapshot_key(name)?;
        let _guard = self.write_lock.lock();

        // Name uniqueness is the serialization point for snapshot creation
        if self.storage.key_exists(&key)? {
            return Err(StoreError::SnapshotNameExists(name.to_string()));
        }

        // Step 1: pin every live symbol's current version
        let mut pinned = BTreeMap::new();
        for ref_key in self.storage.iter_type(KeyType::VersionRef, None)? {
            let symbol = ref_key.id;
            if skip.iter().any(|s| s == &symbol) || overrides.contains_key(&symbol) {
                continue;
            }
            if let Some(current) = self.read_ref(&symbol)?.and_then(|rec| rec.current) {
                pinned.insert(symbol, current);
            }
        }

        // Step 2: apply explicit overrides, validating each version exists
        for (symbol, version_id) in overrides {
            if skip.iter().any(|s| s == &symbol) {
                continue;
            }
            if !self.storage.key_exists(&version_key(&symbol, version_id)?)? {
                return Err(StoreError::VersionNotFound { symbol, version_id });
            }
            pinned.insert(symbol, version_id);
        }

        // Step 3: persist the snapshot record
        let rec = SnapshotRecord {
            pinned,
            metadata,
            created_ts: now_nanos(),
        };
        let segment = encode_record(&rec, rec.created_ts)?;
        self.storage
            .write(KeySegmentPair::new(key, segment))
            .map_err(|e| match e {
                StoreError::DuplicateKey(_) => StoreError::SnapshotNameExists(name.to_string()),
                other => other,
            })?;

        tracing::debug!(name, "created snapshot");
        Ok(())
    }

    /// Delete a snapshot and physically remove every version it pinned that
    /// is now orphaned (not current, not pinned by a surviving snapshot).
    pub fn delete_snapshot(&self, name: &str) -> Result<()> {
        let key = snapshot_key(name)?;
        let _guard = self.write_lock.lock();

        let rec = self.read_snapshot(name)?;

        // Step 1: remove the snapshot entity, dropping its references
        self.storage.remove(&key, RemoveOpts::default())?;

        // Step 2: recompute liveness of what it pinned
        let mut removed = 0usize;
        for (symbol, version_id) in &rec.pinned {
            let is_current = self
                .read_ref(symbol)?
                .and_then(|rec| rec.current)
                .is_some_and(|current| current == *version_id);
            if is_current {
                continue;
            }
            let surviving = self.pinned_versions_of(symbol, Some(name))?;
            if surviving.contains(version_id) {
                continue;
            }
            self.storage
                .remove(&version_key(symbol, *version_id)?, RemoveOpts::default())?;
            removed += 1;
        }

        tracing::debug!(name, removed, "deleted snapshot");
        Ok(())
    }

    /// All live snapshots: name -> caller metadata
    pub fn list_snapshots(&self) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        let mut snapshots = BTreeMap::new();
        for key in self.storage.iter_type(KeyType::Snapshot, None)? {
            let rec = self.read_snapshot(&key.id)?;
            snapshots.insert(key.id, rec.metadata);
        }
        Ok(snapshots)
    }

    /// List stored versions with their referencing snapshots.
    ///
    /// `symbol` restricts to one symbol; `snapshot` restricts to versions
    /// that snapshot pins (and fails with `KeyNotFound` if it is missing).
    /// Output is ordered by symbol, newest version first.
    pub fn list_versions(
        &self,
        symbol: Option<&str>,
        snapshot: Option<&str>,
    ) -> Result<Vec<VersionInfo>> {
        let snaps = self.all_snapshots()?;

        let restrict: Option<&SnapshotRecord> = match snapshot {
            Some(name) => {
                // Missing snapshot is an error, not an empty listing
                if !snaps.contains_key(name) {
                    return Err(StoreError::KeyNotFound(name.to_string()));
                }
                snaps.get(name)
            }
            None => None,
        };

        let mut infos = Vec::new();
        for key in self.storage.iter_type(KeyType::Version, symbol)? {
            if symbol.is_some_and(|s| s != key.id) {
                continue;
            }
            if restrict.is_some_and(|rec| rec.pinned.get(&key.id) != Some(&key.version_id)) {
                continue;
            }

            let pair = self.storage.read(&key, ReadOpts::default())?;
            let snapshots: Vec<String> = snaps
                .iter()
                .filter(|(_, rec)| rec.pinned.get(&key.id) == Some(&key.version_id))
                .map(|(name, _)| name.clone())
                .collect();

            infos.push(VersionInfo {
                symbol: key.id,
                version_id: key.version_id,
                created_ts: pair.segment.header().start_ts,
                snapshots,
            });
        }

        infos.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(b.version_id.cmp(&a.version_id))
        });
        Ok(infos)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Read a symbol's ref record; `Ok(None)` when the symbol was never
    /// written
    fn read_ref(&self, symbol: &str) -> Result<Option<VersionRecord>> {
        match self.storage.read(&ref_key(symbol)?, ReadOpts::default()) {
            Ok(pair) => Ok(Some(decode_record(&pair.segment)?)),
            Err(StoreError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a ref record; upsert because the first write of a symbol
    /// creates it
    fn persist_ref(&self, symbol: &str, rec: &VersionRecord) -> Result<()> {
        let segment = encode_record(rec, rec.updated_ts)?;
        self.storage.update(
            KeySegmentPair::new(ref_key(symbol)?, segment),
            UpdateOpts { upsert: true },
        )
    }

    fn read_snapshot(&self, name: &str) -> Result<SnapshotRecord> {
        let pair = self
            .storage
            .read(&snapshot_key(name)?, ReadOpts::default())?;
        decode_record(&pair.segment)
    }

    fn all_snapshots(&self) -> Result<BTreeMap<String, SnapshotRecord>> {
        let mut snaps = BTreeMap::new();
        for key in self.storage.iter_type(KeyType::Snapshot, None)? {
            let rec = self.read_snapshot(&key.id)?;
            snaps.insert(key.id, rec);
        }
        Ok(snaps)
    }

    /// Versions of `symbol` pinned by live snapshots, optionally excluding
    /// one snapshot (the one being deleted)
    fn pinned_versions_of(&self, symbol: &str, except: Option<&str>) -> Result<HashSet<u64>> {
        let mut pinned = HashSet::new();
        for key in self.storage.iter_type(KeyType::Snapshot, None)? {
            if except.is_some_and(|name| name == key.id) {
                continue;
            }
            let rec = self.read_snapshot(&key.id)?;
            if let Some(v) = rec.pinned.get(symbol) {
                pinned.insert(*v);
            }
        }
        Ok(pinned)
    }
}

// =============================================================================
// Key Construction and Record Codecs
// =============================================================================

fn ref_key(symbol: &str) -> Result<Key> {
    Key::atom(KeyType::VersionRef, symbol, 0)
}

fn version_key(symbol: &str, version_id: u64) -> Result<Key> {
    Key::atom(KeyType::Version, symbol, version_id)
}

fn snapshot_key(name: &str) -> Result<Key> {
    Key::atom(KeyType::Snapshot, name, 0)
}

fn encode_record<T: serde::Serialize>(rec: &T, start_ts: i64) -> Result<Segment> {
    let bytes = bincode::serialize(rec)?;
    Ok(Segment::new(SegmentHeader { start_ts }, Bytes::from(bytes)))
}

fn decode_record<T: serde::de::DeserializeOwned>(segment: &Segment) -> Result<T> {
    Ok(bincode::deserialize(segment.buffer())?)
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
