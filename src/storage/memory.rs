//! In-memory backend
//!
//! Process-local associative store with the same strict operation contract
//! as the mapped-file backend: duplicate writes fail, missing keys fail,
//! observable error behavior is identical so one parametrized test suite
//! covers both. Nothing survives the process.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::key::{Key, KeyType};
use crate::segment::{KeySegmentPair, Segment};

use super::{ReadOpts, RemoveOpts, Storage, UpdateOpts};

/// Process-local storage backend (testing, ephemeral scratch libraries)
#[derive(Default)]
pub struct MemoryStorage {
    /// Object path -> stored segment; RwLock gives concurrent readers and
    /// serializes the check-then-insert of conflicting writers
    objects: RwLock<BTreeMap<String, Segment>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn write(&self, kv: KeySegmentPair) -> Result<()> {
        let path = kv.key.object_path();
        let mut objects = self.objects.write();

        if objects.contains_key(&path) {
            return Err(StoreError::DuplicateKey(path));
        }
        objects.insert(path, kv.segment);
        Ok(())
    }

    fn read(&self, key: &Key, _opts: ReadOpts) -> Result<KeySegmentPair> {
        let path = key.object_path();
        let objects = self.objects.read();

        let segment = objects
            .get(&path)
            .cloned()
            .ok_or(StoreError::KeyNotFound(path))?;
        Ok(KeySegmentPair::new(key.clone(), segment))
    }

    fn update(&self, kv: KeySegmentPair, opts: UpdateOpts) -> Result<()> {
        let path = kv.key.object_path();
        let mut objects = self.objects.write();

        if !objects.contains_key(&path) && !opts.upsert {
            return Err(StoreError::KeyNotFound(path));
        }
        objects.insert(path, kv.segment);
        Ok(())
    }

    fn remove(&self, key: &Key, _opts: RemoveOpts) -> Result<()> {
        let path = key.object_path();
        let mut objects = self.objects.write();

        if objects.remove(&path).is_none() {
            return Err(StoreError::KeyNotFound(path));
        }
        Ok(())
    }

    fn key_exists(&self, key: &Key) -> Result<bool> {
        Ok(self.objects.read().contains_key(&key.object_path()))
    }

    fn iter_type(&self, key_type: KeyType, prefix: Option<&str>) -> Result<Vec<Key>> {
        let dir_prefix = format!("{}/", key_type.dir());
        let objects = self.objects.read();

        let mut keys = Vec::new();
        for path in objects
            .range(dir_prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&dir_prefix))
            .map(|(p, _)| p)
        {
            let key = Key::parse_object_path(path)?;
            if prefix.map_or(true, |p| key.id.starts_with(p)) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
