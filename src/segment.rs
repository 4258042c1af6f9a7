//! Segment model
//!
//! A segment is the unit the storage layer persists: a small fixed header
//! plus an opaque payload buffer. The layer never interprets payload bytes;
//! the header's start timestamp exists so callers can range-filter without
//! decoding anything.

use bytes::Bytes;

use crate::key::Key;

/// Fixed header stored alongside every payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Logical start timestamp of the payload's contents
    pub start_ts: i64,
}

/// Header + opaque payload bytes.
///
/// Immutable once constructed; the storage layer never mutates payload
/// bytes, and reads hand back an independently owned segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    header: SegmentHeader,
    buffer: Bytes,
}

impl Segment {
    pub fn new(header: SegmentHeader, buffer: impl Into<Bytes>) -> Self {
        Self {
            header,
            buffer: buffer.into(),
        }
    }

    /// Segment with an empty payload and zeroed header
    pub fn empty() -> Self {
        Self {
            header: SegmentHeader::default(),
            buffer: Bytes::new(),
        }
    }

    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// A key together with the segment stored under it
#[derive(Debug, Clone)]
pub struct KeySegmentPair {
    pub key: Key,
    pub segment: Segment,
}

impl KeySegmentPair {
    pub fn new(key: Key, segment: Segment) -> Self {
        Self { key, segment }
    }
}
