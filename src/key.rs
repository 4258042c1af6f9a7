//! Key model
//!
//! Every stored object is addressed by a `(key_type, id, version_id,
//! optional time range)` tuple. The tuple is totally ordered and unique
//! within a backend; its deterministic object-path encoding is what each
//! backend uses as its native name (mapped-file catalogue key, object name).

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Enumerated category of a stored object.
///
/// Determines which layer interprets the payload; the storage backends
/// treat all payloads as opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// One immutable write of a symbol
    Version,

    /// Per-symbol pointer record (current version, next version counter)
    VersionRef,

    /// Named snapshot record pinning a (symbol -> version) set
    Snapshot,

    /// Columnar data block
    TableData,

    /// Index block over data blocks (carries a time range)
    TableIndex,
}

impl KeyType {
    /// Short directory name used as the first object-path component
    pub fn dir(&self) -> &'static str {
        match self {
            KeyType::Version => "ver",
            KeyType::VersionRef => "vref",
            KeyType::Snapshot => "snap",
            KeyType::TableData => "tdata",
            KeyType::TableIndex => "tindex",
        }
    }

    fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "ver" => Some(KeyType::Version),
            "vref" => Some(KeyType::VersionRef),
            "snap" => Some(KeyType::Snapshot),
            "tdata" => Some(KeyType::TableData),
            "tindex" => Some(KeyType::TableIndex),
            _ => None,
        }
    }
}

/// Identifier tuple locating one stored object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Category of the stored object
    pub key_type: KeyType,

    /// Symbol name or scope identifier; not unique alone
    pub id: String,

    /// Generation counter, monotonically increasing per (key_type, id).
    /// Assigned by the writer, not the storage layer.
    pub version_id: u64,

    /// Inclusive logical time range; only index/range key types carry one
    pub time_range: Option<(i64, i64)>,
}

impl Key {
    /// Build a key with no time range.
    ///
    /// The id must not contain `/` (it is embedded in the object path).
    pub fn atom(key_type: KeyType, id: impl Into<String>, version_id: u64) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(StoreError::InvalidId(id));
        }
        Ok(Self {
            key_type,
            id,
            version_id,
            time_range: None,
        })
    }

    /// Attach an inclusive time range (index key types)
    pub fn with_time_range(mut self, start: i64, end: i64) -> Self {
        self.time_range = Some((start, end));
        self
    }

    /// Deterministic object-path encoding:
    /// `"{type_dir}/{id}/{version_id}"` plus `"/{start}~{end}"` for ranged keys
    pub fn object_path(&self) -> String {
        match self.time_range {
            Some((start, end)) => format!(
                "{}/{}/{}/{}~{}",
                self.key_type.dir(),
                self.id,
                self.version_id,
                start,
                end
            ),
            None => format!("{}/{}/{}", self.key_type.dir(), self.id, self.version_id),
        }
    }

    /// Inverse of [`Key::object_path`]
    pub fn parse_object_path(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('/').collect();
        let bad = || StoreError::Unexpected(format!("malformed object path: {path}"));

        let (dir, id, vid, range) = match parts.as_slice() {
            [dir, id, vid] => (*dir, *id, *vid, None),
            [dir, id, vid, range] => (*dir, *id, *vid, Some(*range)),
            _ => return Err(bad()),
        };

        let key_type = KeyType::from_dir(dir).ok_or_else(bad)?;
        let version_id: u64 = vid.parse().map_err(|_| bad())?;

        let time_range = match range {
            Some(r) => {
                let (s, e) = r.split_once('~').ok_or_else(bad)?;
                Some((
                    s.parse().map_err(|_| bad())?,
                    e.parse().map_err(|_| bad())?,
                ))
            }
            None => None,
        };

        Ok(Self {
            key_type,
            id: id.to_string(),
            version_id,
            time_range,
        })
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.object_path())
    }
}
