//! Object-storage backend
//!
//! Keys map deterministically to object names under a bucket/prefix. The
//! transport sits behind [`S3ClientApi`] so tests can substitute the
//! scripted [`MockS3Client`]; deployments inject a real transport through
//! [`S3Storage::with_client`].
//!
//! ## Documented deviations from the strict contract
//! These follow the provider's native semantics rather than emulating
//! strictness with an extra existence round trip:
//! - `write` of an existing key **overwrites** instead of failing with
//!   `DuplicateKey`
//! - `update` of a missing key **creates** it instead of failing with
//!   `KeyNotFound`
//!
//! ## Error classification
//! Every native failure is classified before returning: not-found,
//! permission (access denied / invalid credentials), retryable (connection
//! reset, throttling, timeout), or unexpected. Callers apply differentiated
//! retry policy on the result; this layer never retries.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::S3Config;
use crate::error::{Result, StoreError};
use crate::key::{Key, KeyType};
use crate::segment::{KeySegmentPair, Segment, SegmentHeader};

mod client;
mod mock;

pub use client::{S3ClientApi, S3Error, S3ErrorCode, S3Op};
pub use mock::MockS3Client;

/// Object body layout: 8-byte little-endian start timestamp, then payload
const BODY_HEADER_SIZE: usize = 8;

/// Networked bucket/prefix storage backend
pub struct S3Storage {
    client: Arc<dyn S3ClientApi>,
    prefix: String,
}

impl S3Storage {
    /// Open the backend described by `config`.
    ///
    /// Only the mock transport is wired in directly; a real transport must
    /// be injected with [`S3Storage::with_client`].
    pub fn open(config: &S3Config) -> Result<Self> {
        if !config.use_mock_storage_for_testing {
            return Err(StoreError::Config(
                "no object-storage transport configured; \
                 use S3Storage::with_client or enable the mock transport"
                    .to_string(),
            ));
        }
        tracing::info!(
            bucket = %config.bucket,
            prefix = %config.prefix,
            "opened object storage with mock transport"
        );
        Ok(Self {
            client: Arc::new(MockS3Client::new()),
            prefix: config.prefix.clone(),
        })
    }

    /// Open with a caller-supplied transport
    pub fn with_client(config: &S3Config, client: Arc<dyn S3ClientApi>) -> Self {
        Self {
            client,
            prefix: config.prefix.clone(),
        }
    }

    fn object_name(&self, key: &Key) -> String {
        format!("{}/{}", self.prefix, key.object_path())
    }

    fn encode_body(segment: &Segment) -> Bytes {
        let mut body = BytesMut::with_capacity(BODY_HEADER_SIZE + segment.len());
        body.put_i64_le(segment.header().start_ts);
        body.extend_from_slice(segment.buffer());
        body.freeze()
    }

    fn decode_body(name: &str, body: Bytes) -> Result<Segment> {
        if body.len() < BODY_HEADER_SIZE {
            return Err(StoreError::Unexpected(format!(
                "truncated object body for {name}"
            )));
        }
        let start_ts = i64::from_le_bytes(body[0..BODY_HEADER_SIZE].try_into().unwrap());
        Ok(Segment::new(
            SegmentHeader { start_ts },
            body.slice(BODY_HEADER_SIZE..),
        ))
    }
}

/// Map one native error onto the shared taxonomy. Deterministic per
/// (operation, code), so repeated failures classify identically.
fn classify(op: S3Op, name: &str, err: S3Error) -> StoreError {
    match err.code {
        S3ErrorCode::NoSuchKey | S3ErrorCode::NoSuchBucket => {
            StoreError::KeyNotFound(name.to_string())
        }
        S3ErrorCode::AccessDenied | S3ErrorCode::InvalidAccessKeyId => StoreError::Permission(
            format!("{op:?} {name}: {}", err.message),
        ),
        _ if err.retryable => {
            StoreError::Retryable(format!("{op:?} {name}: {:?}: {}", err.code, err.message))
        }
        _ => StoreError::Unexpected(format!("{op:?} {name}: {:?}: {}", err.code, err.message)),
    }
}

impl super::Storage for S3Storage {
    /// Deviation: overwrites silently when the object already exists.
    fn write(&self, kv: KeySegmentPair) -> Result<()> {
        let name = self.object_name(&kv.key);
        let body = Self::encode_body(&kv.segment);
        self.client
            .put_object(&name, body)
            .map_err(|e| classify(S3Op::Put, &name, e))
    }

    fn read(&self, key: &Key, _opts: super::ReadOpts) -> Result<KeySegmentPair> {
        let name = self.object_name(key);
        let body = self
            .client
            .get_object(&name)
            .map_err(|e| classify(S3Op::Get, &name, e))?;
        Ok(KeySegmentPair::new(
            key.clone(),
            Self::decode_body(&name, body)?,
        ))
    }

    /// Deviation: creates the object when it does not exist.
    fn update(&self, kv: KeySegmentPair, _opts: super::UpdateOpts) -> Result<()> {
        let name = self.object_name(&kv.key);
        let body = Self::encode_body(&kv.segment);
        self.client
            .put_object(&name, body)
            .map_err(|e| classify(S3Op::Put, &name, e))
    }

    fn remove(&self, key: &Key, _opts: super::RemoveOpts) -> Result<()> {
        let name = self.object_name(key);
        self.client
            .delete_object(&name)
            .map_err(|e| classify(S3Op::Delete, &name, e))
    }

    fn key_exists(&self, key: &Key) -> Result<bool> {
        let name = self.object_name(key);
        match self.client.head_object(&name) {
            Ok(()) => Ok(true),
            Err(e) => match classify(S3Op::Head, &name, e) {
                // A plain miss is not an error for existence checks
                StoreError::KeyNotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    fn iter_type(&self, key_type: KeyType, prefix: Option<&str>) -> Result<Vec<Key>> {
        let list_prefix = format!("{}/{}/", self.prefix, key_type.dir());
        let names = self
            .client
            .list_objects(&list_prefix)
            .map_err(|e| classify(S3Op::List, &list_prefix, e))?;

        let strip = format!("{}/", self.prefix);
        let mut keys = Vec::new();
        for name in names {
            let path = name.strip_prefix(&strip).unwrap_or(&name);
            let key = Key::parse_object_path(path)?;
            if prefix.map_or(true, |p| key.id.starts_with(p)) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
