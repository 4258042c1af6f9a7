//! Version & snapshot protocol tests
//!
//! These tests verify:
//! - Monotonic, never-reused version ids per symbol
//! - Read-as-of (latest, explicit version, snapshot)
//! - Snapshot round-trips surviving symbol deletion and supersession
//! - Reference-counted retention on snapshot deletion
//! - Protocol-record persistence across a mapped-file reopen

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use chronostore::storage::{LmdbStorage, MemoryStorage};
use chronostore::{
    AsOf, LmdbConfig, Segment, SegmentHeader, Storage, StoreError, VersionStore,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn store() -> VersionStore {
    VersionStore::new(Arc::new(MemoryStorage::new()))
}

fn segment(ts: i64, payload: &[u8]) -> Segment {
    Segment::new(SegmentHeader { start_ts: ts }, payload.to_vec())
}

fn no_meta() -> BTreeMap<String, String> {
    BTreeMap::new()
}

fn no_overrides() -> BTreeMap<String, u64> {
    BTreeMap::new()
}

fn payload_of(store: &VersionStore, symbol: &str, as_of: AsOf) -> Vec<u8> {
    store
        .read_symbol(symbol, as_of)
        .unwrap()
        .segment
        .buffer()
        .to_vec()
}

// =============================================================================
// Version Numbering
// =============================================================================

#[test]
fn test_versions_increment_per_symbol() {
    let store = store();
    assert_eq!(store.write_symbol("sym", segment(1, b"a")).unwrap(), 0);
    assert_eq!(store.write_symbol("sym", segment(2, b"b")).unwrap(), 1);
    assert_eq!(store.write_symbol("other", segment(3, b"c")).unwrap(), 0);

    assert_eq!(payload_of(&store, "sym", AsOf::Latest), b"b");
    assert_eq!(payload_of(&store, "sym", AsOf::Version(0)), b"a");
}

#[test]
fn test_version_ids_never_reused_after_delete() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();
    store.delete_symbol("sym").unwrap();

    // A fresh write continues the sequence instead of restarting at 0
    assert_eq!(store.write_symbol("sym", segment(2, b"v1")).unwrap(), 1);
}

#[test]
fn test_read_latest_of_unknown_symbol_fails() {
    let store = store();
    let err = store.read_symbol("nope", AsOf::Latest).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_read_latest_after_delete_fails() {
    let store = store();
    store.write_symbol("sym", segment(1, b"a")).unwrap();
    store.delete_symbol("sym").unwrap();

    let err = store.read_symbol("sym", AsOf::Latest).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_delete_unknown_symbol_fails() {
    let store = store();
    let err = store.delete_symbol("nope").unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_invalid_symbol_rejected() {
    let store = store();
    let err = store.write_symbol("a/b", segment(0, b"x")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidId(_)));
}

// =============================================================================
// Snapshot Round-Trips
// =============================================================================

#[test]
fn test_snapshot_pins_survive_delete_and_rewrite() {
    let store = store();
    store.write_symbol("sym1", segment(1, b"v0 data")).unwrap();

    let mut overrides = no_overrides();
    overrides.insert("sym1".to_string(), 0);
    store.snapshot("S", no_meta(), overrides, &[]).unwrap();

    // Superseding and deleting the symbol must not disturb the pin
    store.write_symbol("sym1", segment(2, b"v1 data")).unwrap();
    store.delete_symbol("sym1").unwrap();

    assert_eq!(
        payload_of(&store, "sym1", AsOf::Snapshot("S".to_string())),
        b"v0 data"
    );
}

#[test]
fn test_snapshot_defaults_to_current_versions() {
    let store = store();
    store.write_symbol("a", segment(1, b"a0")).unwrap();
    store.write_symbol("a", segment(2, b"a1")).unwrap();
    store.write_symbol("b", segment(3, b"b0")).unwrap();

    store.snapshot("snap", no_meta(), no_overrides(), &[]).unwrap();

    assert_eq!(payload_of(&store, "a", AsOf::Snapshot("snap".to_string())), b"a1");
    assert_eq!(payload_of(&store, "b", AsOf::Snapshot("snap".to_string())), b"b0");
}

#[test]
fn test_snapshot_skip_list_excludes_symbol() {
    let store = store();
    store.write_symbol("keep", segment(1, b"k")).unwrap();
    store.write_symbol("skip", segment(2, b"s")).unwrap();

    store
        .snapshot("snap", no_meta(), no_overrides(), &["skip".to_string()])
        .unwrap();

    assert_eq!(payload_of(&store, "keep", AsOf::Snapshot("snap".to_string())), b"k");
    let err = store
        .read_symbol("skip", AsOf::Snapshot("snap".to_string()))
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_snapshot_override_must_exist() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();

    let mut overrides = no_overrides();
    overrides.insert("sym".to_string(), 5);
    let err = store.snapshot("snap", no_meta(), overrides, &[]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionNotFound { version_id: 5, .. }
    ));

    // Nothing was persisted
    assert!(store.list_snapshots().unwrap().is_empty());
}

#[test]
fn test_duplicate_snapshot_name_leaves_first_intact() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();

    let mut meta = no_meta();
    meta.insert("owner".to_string(), "first".to_string());
    store.snapshot("X", meta, no_overrides(), &[]).unwrap();

    // Advance the symbol, then try to reuse the name
    store.write_symbol("sym", segment(2, b"v1")).unwrap();
    let mut meta2 = no_meta();
    meta2.insert("owner".to_string(), "second".to_string());
    let err = store.snapshot("X", meta2, no_overrides(), &[]).unwrap_err();
    assert!(matches!(err, StoreError::SnapshotNameExists(_)));

    // The original pinned set and metadata are unchanged
    let snapshots = store.list_snapshots().unwrap();
    assert_eq!(snapshots["X"]["owner"], "first");
    assert_eq!(payload_of(&store, "sym", AsOf::Snapshot("X".to_string())), b"v0");
}

// =============================================================================
// Retention
// =============================================================================

#[test]
fn test_delete_snapshot_removes_orphaned_version() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();
    let mut overrides = no_overrides();
    overrides.insert("sym".to_string(), 0);

    store.write_symbol("sym", segment(2, b"v1")).unwrap();
    store.snapshot("S", no_meta(), overrides, &[]).unwrap();

    store.delete_snapshot("S").unwrap();

    // v0 was pinned only by S and is not current: physically gone
    let err = store.read_symbol("sym", AsOf::Version(0)).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));

    // v1 is current and untouched
    assert_eq!(payload_of(&store, "sym", AsOf::Version(1)), b"v1");
}

#[test]
fn test_version_pinned_by_second_snapshot_survives() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();
    let mut overrides = no_overrides();
    overrides.insert("sym".to_string(), 0);

    store.write_symbol("sym", segment(2, b"v1")).unwrap();
    store.snapshot("S1", no_meta(), overrides.clone(), &[]).unwrap();
    store.snapshot("S2", no_meta(), overrides, &[]).unwrap();

    store.delete_snapshot("S1").unwrap();

    // S2 still pins v0
    assert_eq!(payload_of(&store, "sym", AsOf::Version(0)), b"v0");

    store.delete_snapshot("S2").unwrap();
    let err = store.read_symbol("sym", AsOf::Version(0)).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_delete_symbol_keeps_snapshot_pinned_versions() {
    let store = store();
    store.write_symbol("sym", segment(1, b"v0")).unwrap();
    store.write_symbol("sym", segment(2, b"v1")).unwrap();
    store.snapshot("S", no_meta(), no_overrides(), &[]).unwrap(); // pins v1

    store.delete_symbol("sym").unwrap();

    // v1 survives through the snapshot; v0 was orphaned and removed
    assert_eq!(payload_of(&store, "sym", AsOf::Snapshot("S".to_string())), b"v1");
    let err = store.read_symbol("sym", AsOf::Version(0)).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_delete_missing_snapshot_fails() {
    let store = store();
    let err = store.delete_snapshot("nope").unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

// =============================================================================
// The Four-Symbol Scenario
// =============================================================================

#[test]
fn test_four_symbol_retention_scenario() {
    let store = store();

    // Four symbols at v0, then sym_0 and sym_1 advance to v1
    for i in 0..4 {
        store
            .write_symbol(&format!("sym_{i}"), segment(i, format!("sym_{i} v0").as_bytes()))
            .unwrap();
    }
    store.write_symbol("sym_0", segment(10, b"sym_0 v1")).unwrap();
    store.write_symbol("sym_1", segment(11, b"sym_1 v1")).unwrap();

    // Snapshot with no overrides pins every current version
    store.snapshot("s0", no_meta(), no_overrides(), &[]).unwrap();

    // Deleting sym_0 clears its current pointer but s0 still resolves v1
    store.delete_symbol("sym_0").unwrap();
    let err = store.read_symbol("sym_0", AsOf::Latest).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
    assert_eq!(
        payload_of(&store, "sym_0", AsOf::Snapshot("s0".to_string())),
        b"sym_0 v1"
    );

    // Dropping the snapshot orphans sym_0 v1 and removes it physically
    store.delete_snapshot("s0").unwrap();
    let err = store.read_symbol("sym_0", AsOf::Version(1)).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));

    let versions = store.list_versions(None, None).unwrap();
    assert!(versions.iter().all(|v| v.symbol != "sym_0"));

    // The other symbols are untouched
    assert_eq!(payload_of(&store, "sym_1", AsOf::Latest), b"sym_1 v1");
    assert_eq!(payload_of(&store, "sym_2", AsOf::Latest), b"sym_2 v0");
    assert_eq!(payload_of(&store, "sym_3", AsOf::Latest), b"sym_3 v0");
}

// =============================================================================
// Listings
// =============================================================================

#[test]
fn test_list_symbols_excludes_deleted() {
    let store = store();
    store.write_symbol("alive", segment(1, b"a")).unwrap();
    store.write_symbol("dead", segment(2, b"d")).unwrap();
    store.delete_symbol("dead").unwrap();

    assert_eq!(store.list_symbols().unwrap(), vec!["alive".to_string()]);
}

#[test]
fn test_list_versions_reports_referencing_snapshots() {
    let store = store();
    store.write_symbol("sym", segment(100, b"v0")).unwrap();
    store.snapshot("pin", no_meta(), no_overrides(), &[]).unwrap();
    store.write_symbol("sym", segment(200, b"v1")).unwrap();

    let versions = store.list_versions(Some("sym"), None).unwrap();
    assert_eq!(versions.len(), 2);

    // Newest first
    assert_eq!(versions[0].version_id, 1);
    assert!(versions[0].snapshots.is_empty());
    assert_eq!(versions[0].created_ts, 200);

    assert_eq!(versions[1].version_id, 0);
    assert_eq!(versions[1].snapshots, vec!["pin".to_string()]);
}

#[test]
fn test_list_versions_filtered_by_snapshot() {
    let store = store();
    store.write_symbol("a", segment(1, b"a0")).unwrap();
    store.snapshot("s", no_meta(), no_overrides(), &[]).unwrap();
    store.write_symbol("a", segment(2, b"a1")).unwrap();
    store.write_symbol("b", segment(3, b"b0")).unwrap(); // written after the snapshot

    let versions = store.list_versions(None, Some("s")).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].symbol, "a");
    assert_eq!(versions[0].version_id, 0);

    let err = store.list_versions(None, Some("missing")).unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[test]
fn test_list_snapshots_returns_metadata() {
    let store = store();
    store.write_symbol("sym", segment(1, b"x")).unwrap();

    let mut meta = no_meta();
    meta.insert("note".to_string(), "eod".to_string());
    store.snapshot("daily", meta, no_overrides(), &[]).unwrap();
    store.snapshot("other", no_meta(), no_overrides(), &[]).unwrap();

    let snapshots = store.list_snapshots().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots["daily"]["note"], "eod");
}

// =============================================================================
// Persistence of Protocol Records (mapped-file backend)
// =============================================================================

#[test]
fn test_protocol_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.dat");
    let config = LmdbConfig::new(&path);

    {
        let storage: Arc<dyn Storage> = Arc::new(LmdbStorage::open(&config).unwrap());
        let store = VersionStore::new(storage);
        store.write_symbol("sym", segment(1, b"v0")).unwrap();
        store.write_symbol("sym", segment(2, b"v1")).unwrap();
        store.snapshot("S", no_meta(), no_overrides(), &[]).unwrap();
    }

    let storage: Arc<dyn Storage> = Arc::new(LmdbStorage::open(&config).unwrap());
    let store = VersionStore::new(storage);

    assert_eq!(payload_of(&store, "sym", AsOf::Latest), b"v1");
    assert_eq!(payload_of(&store, "sym", AsOf::Snapshot("S".to_string())), b"v1");
    assert_eq!(store.list_symbols().unwrap(), vec!["sym".to_string()]);

    // Version numbering continues across the reopen
    assert_eq!(store.write_symbol("sym", segment(3, b"v2")).unwrap(), 2);
}
