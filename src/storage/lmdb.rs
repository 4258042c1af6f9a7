//! Mapped-file backend
//!
//! Single-writer/multi-reader environment backed by one memory-mapped file
//! of fixed, pre-declared maximum size.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Superblock (16 bytes)                       │
//! │ ┌──────────┬───────────┬──────┬───────────┐ │
//! │ │Magic (4) │Version (2)│Rsv(2)│WriteOff(8)│ │
//! │ └──────────┴───────────┴──────┴───────────┘ │
//! ├─────────────────────────────────────────────┤
//! │ Record (repeated, append-only)              │
//! │ ┌────────┬────────┬───────┬────────┬───────┤
//! │ │KeyLen 4│ValLen 4│CRC32 4│StartTs8│Key|Val│
//! │ └────────┴────────┴───────┴────────┴───────┤
//! └─────────────────────────────────────────────┘
//! ```
//! `ValLen == u32::MAX` marks a tombstone (no value bytes follow the key).
//! Removal appends a tombstone record, so it needs free space like any
//! other mutation: on a full map `remove` fails with `CapacityExhausted`
//! and the key stays readable. Recovering space means reopening with a
//! larger `map_size` or `recreate_if_exists`.
//!
//! ## Concurrency
//! An in-memory catalogue (object path -> record location) is guarded by a
//! RwLock: reads and iteration take the read lock, every mutation takes the
//! write lock for the full check-then-append sequence, so a race between
//! two writers of the same new key yields exactly one `DuplicateKey`.
//!
//! ## Durability
//! Each committed mutation flushes the dirty record range and the
//! superblock before returning (fsync-on-commit).

use std::collections::BTreeMap;
use std::fs::OpenOptions;

use bytes::Bytes;
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;

use crate::config::LmdbConfig;
use crate::error::{Result, StoreError};
use crate::key::{Key, KeyType};
use crate::segment::{KeySegmentPair, Segment, SegmentHeader};

use super::{ReadOpts, RemoveOpts, Storage, UpdateOpts};

const MAGIC: &[u8] = b"CHRN";
const FORMAT_VERSION: u16 = 1;
const SUPERBLOCK_SIZE: u64 = 16;
const RECORD_HEADER_SIZE: u64 = 20;
const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Location of the live record for one key
#[derive(Debug, Clone, Copy)]
struct RecordLoc {
    /// Offset of the record header within the map
    offset: u64,
    /// Payload length in bytes
    val_len: u32,
    /// Segment header field, kept in the catalogue for cheap filtering
    start_ts: i64,
}

struct LmdbInner {
    mmap: MmapMut,
    map_size: u64,
    /// Next append position
    write_offset: u64,
    /// Object path -> live record; rebuilt by scanning records on open
    catalogue: BTreeMap<String, RecordLoc>,
}

/// Local memory-mapped file backend
pub struct LmdbStorage {
    inner: RwLock<LmdbInner>,
}

impl LmdbStorage {
    /// Open or create the mapped environment described by `config`.
    ///
    /// Existing contents are replayed to rebuild the catalogue unless
    /// `recreate_if_exists` is set, which truncates the file first.
    pub fn open(config: &LmdbConfig) -> Result<Self> {
        if config.map_size <= SUPERBLOCK_SIZE {
            return Err(StoreError::Config(format!(
                "map_size {} too small for superblock",
                config.map_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(config.recreate_if_exists)
            .open(&config.path)?;

        let existing_len = file.metadata()?.len();
        // The map size is a hard cap declared up front; the file is sparse
        // until records actually land in it.
        file.set_len(config.map_size)?;

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        let mut inner = LmdbInner {
            mmap,
            map_size: config.map_size,
            write_offset: SUPERBLOCK_SIZE,
            catalogue: BTreeMap::new(),
        };

        if existing_len >= SUPERBLOCK_SIZE && &inner.mmap[0..4] == MAGIC {
            inner.replay()?;
        } else {
            inner.init_superblock()?;
        }

        tracing::info!(
            path = %config.path.display(),
            map_size = config.map_size,
            keys = inner.catalogue.len(),
            "opened mapped-file storage"
        );

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    fn read_segment(inner: &LmdbInner, path: &str, loc: RecordLoc) -> Result<Segment> {
        let key_len = path.len() as u64;
        let value_off = (loc.offset + RECORD_HEADER_SIZE + key_len) as usize;
        let value = &inner.mmap[value_off..value_off + loc.val_len as usize];

        let crc_off = loc.offset as usize + 8;
        let stored_crc =
            u32::from_le_bytes(inner.mmap[crc_off..crc_off + 4].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(value);
        if hasher.finalize() != stored_crc {
            tracing::warn!(path, "record checksum mismatch");
            return Err(StoreError::Unexpected(format!(
                "checksum mismatch for key {path}"
            )));
        }

        Ok(Segment::new(
            SegmentHeader {
                start_ts: loc.start_ts,
            },
            Bytes::copy_from_slice(value),
        ))
    }
}

impl LmdbInner {
    fn init_superblock(&mut self) -> Result<()> {
        self.mmap[0..4].copy_from_slice(MAGIC);
        self.mmap[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        self.mmap[6..8].copy_from_slice(&0u16.to_le_bytes());
        self.mmap[8..16].copy_from_slice(&SUPERBLOCK_SIZE.to_le_bytes());
        self.mmap.flush_range(0, SUPERBLOCK_SIZE as usize)?;
        Ok(())
    }

    /// Scan records up to the persisted write offset, rebuilding the
    /// catalogue. Later records for a key supersede earlier ones;
    /// tombstones drop the key.
    fn replay(&mut self) -> Result<()> {
        let version = u16::from_le_bytes(self.mmap[4..6].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(StoreError::Unexpected(format!(
                "unsupported storage format version: {version}"
            )));
        }

        let persisted_offset = u64::from_le_bytes(self.mmap[8..16].try_into().unwrap());
        if persisted_offset < SUPERBLOCK_SIZE || persisted_offset > self.map_size {
            return Err(StoreError::Unexpected(format!(
                "corrupt superblock write offset: {persisted_offset}"
            )));
        }

        let mut pos = SUPERBLOCK_SIZE;
        while pos < persisted_offset {
            if pos + RECORD_HEADER_SIZE > persisted_offset {
                return Err(StoreError::Unexpected(format!(
                    "truncated record header at offset {pos}"
                )));
            }
            let header = &self.mmap[pos as usize..(pos + RECORD_HEADER_SIZE) as usize];
            let key_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
            let val_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
            let start_ts = i64::from_le_bytes(header[12..20].try_into().unwrap());

            let value_len = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as u64 };
            if pos + RECORD_HEADER_SIZE + key_len + value_len > persisted_offset {
                return Err(StoreError::Unexpected(format!(
                    "truncated record at offset {pos}"
                )));
            }

            let key_off = (pos + RECORD_HEADER_SIZE) as usize;
            let path = std::str::from_utf8(&self.mmap[key_off..key_off + key_len as usize])
                .map_err(|_| {
                    StoreError::Unexpected(format!("non-UTF8 key at offset {pos}"))
                })?
                .to_string();

            if val_len == TOMBSTONE_MARKER {
                self.catalogue.remove(&path);
                pos += RECORD_HEADER_SIZE + key_len;
            } else {
                self.catalogue.insert(
                    path,
                    RecordLoc {
                        offset: pos,
                        val_len,
                        start_ts,
                    },
                );
                pos += RECORD_HEADER_SIZE + key_len + val_len as u64;
            }
        }

        self.write_offset = persisted_offset;
        Ok(())
    }

    /// Append one record and commit it durably. The caller holds the write
    /// lock and has already performed the duplicate/not-found check.
    fn append_record(&mut self, path: &str, value: &[u8], val_len: u32, start_ts: i64) -> Result<u64> {
        let key_len = path.len() as u64;
        let value_len = if val_len == TOMBSTONE_MARKER {
            0
        } else {
            value.len() as u64
        };
        let record_len = RECORD_HEADER_SIZE + key_len + value_len;

        if self.write_offset + record_len > self.map_size {
            return Err(StoreError::CapacityExhausted(format!(
                "map size {} reached writing key {path}",
                self.map_size
            )));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(value);
        let crc = hasher.finalize();

        let offset = self.write_offset;
        let base = offset as usize;
        self.mmap[base..base + 4].copy_from_slice(&(key_len as u32).to_le_bytes());
        self.mmap[base + 4..base + 8].copy_from_slice(&val_len.to_le_bytes());
        self.mmap[base + 8..base + 12].copy_from_slice(&crc.to_le_bytes());
        self.mmap[base + 12..base + 20].copy_from_slice(&start_ts.to_le_bytes());

        let key_off = base + RECORD_HEADER_SIZE as usize;
        self.mmap[key_off..key_off + key_len as usize].copy_from_slice(path.as_bytes());
        let value_off = key_off + key_len as usize;
        self.mmap[value_off..value_off + value_len as usize].copy_from_slice(value);

        self.write_offset = offset + record_len;
        self.mmap[8..16].copy_from_slice(&self.write_offset.to_le_bytes());

        // Commit: record bytes first, then the superblock pointer
        self.mmap.flush_range(base, record_len as usize)?;
        self.mmap.flush_range(0, SUPERBLOCK_SIZE as usize)?;

        Ok(offset)
    }
}

impl Storage for LmdbStorage {
    fn write(&self, kv: KeySegmentPair) -> Result<()> {
        let path = kv.key.object_path();
        let mut inner = self.inner.write();

        if inner.catalogue.contains_key(&path) {
            return Err(StoreError::DuplicateKey(path));
        }

        let val_len = kv.segment.len() as u32;
        let start_ts = kv.segment.header().start_ts;
        let offset = inner.append_record(&path, kv.segment.buffer(), val_len, start_ts)?;
        inner.catalogue.insert(
            path,
            RecordLoc {
                offset,
                val_len,
                start_ts,
            },
        );
        Ok(())
    }

    fn read(&self, key: &Key, _opts: ReadOpts) -> Result<KeySegmentPair> {
        let path = key.object_path();
        let inner = self.inner.read();

        let loc = *inner
            .catalogue
            .get(&path)
            .ok_or_else(|| StoreError::KeyNotFound(path.clone()))?;

        let segment = Self::read_segment(&inner, &path, loc)?;
        Ok(KeySegmentPair::new(key.clone(), segment))
    }

    fn update(&self, kv: KeySegmentPair, opts: UpdateOpts) -> Result<()> {
        let path = kv.key.object_path();
        let mut inner = self.inner.write();

        if !inner.catalogue.contains_key(&path) && !opts.upsert {
            return Err(StoreError::KeyNotFound(path));
        }

        let val_len = kv.segment.len() as u32;
        let start_ts = kv.segment.header().start_ts;
        let offset = inner.append_record(&path, kv.segment.buffer(), val_len, start_ts)?;
        inner.catalogue.insert(
            path,
            RecordLoc {
                offset,
                val_len,
                start_ts,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &Key, _opts: RemoveOpts) -> Result<()> {
        let path = key.object_path();
        let mut inner = self.inner.write();

        if !inner.catalogue.contains_key(&path) {
            return Err(StoreError::KeyNotFound(path));
        }

        inner.append_record(&path, &[], TOMBSTONE_MARKER, 0)?;
        inner.catalogue.remove(&path);
        Ok(())
    }

    fn key_exists(&self, key: &Key) -> Result<bool> {
        Ok(self.inner.read().catalogue.contains_key(&key.object_path()))
    }

    fn iter_type(&self, key_type: KeyType, prefix: Option<&str>) -> Result<Vec<Key>> {
        let dir_prefix = format!("{}/", key_type.dir());
        let inner = self.inner.read();

        let mut keys = Vec::new();
        for path in inner
            .catalogue
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
        "lmdb"
    }
}
