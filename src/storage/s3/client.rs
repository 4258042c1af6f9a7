//! Object-storage transport contract
//!
//! The thin surface the backend needs from any object-store provider, plus
//! the native error shape the backend classifies at its boundary.

use bytes::Bytes;

/// Operation being attempted when a native error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Op {
    Get,
    Put,
    Delete,
    Head,
    List,
}

/// Native error codes surfaced by object-store providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3ErrorCode {
    NoSuchKey,
    NoSuchBucket,
    AccessDenied,
    InvalidAccessKeyId,
    NetworkConnection,
    SlowDown,
    RequestTimeout,
    Unknown,
}

impl S3ErrorCode {
    /// Wire name used by the mock's failure triggers
    pub fn as_str(&self) -> &'static str {
        match self {
            S3ErrorCode::NoSuchKey => "NoSuchKey",
            S3ErrorCode::NoSuchBucket => "NoSuchBucket",
            S3ErrorCode::AccessDenied => "AccessDenied",
            S3ErrorCode::InvalidAccessKeyId => "InvalidAccessKeyId",
            S3ErrorCode::NetworkConnection => "NetworkConnection",
            S3ErrorCode::SlowDown => "SlowDown",
            S3ErrorCode::RequestTimeout => "RequestTimeout",
            S3ErrorCode::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NoSuchKey" => Some(S3ErrorCode::NoSuchKey),
            "NoSuchBucket" => Some(S3ErrorCode::NoSuchBucket),
            "AccessDenied" => Some(S3ErrorCode::AccessDenied),
            "InvalidAccessKeyId" => Some(S3ErrorCode::InvalidAccessKeyId),
            "NetworkConnection" => Some(S3ErrorCode::NetworkConnection),
            "SlowDown" => Some(S3ErrorCode::SlowDown),
            "RequestTimeout" => Some(S3ErrorCode::RequestTimeout),
            "Unknown" => Some(S3ErrorCode::Unknown),
            _ => None,
        }
    }
}

/// One native failure as reported by the transport
#[derive(Debug, Clone)]
pub struct S3Error {
    pub code: S3ErrorCode,
    pub message: String,
    /// Whether the provider marked the failure transient
    pub retryable: bool,
}

impl S3Error {
    pub fn new(code: S3ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }

    /// Convenience for a missing-object failure
    pub fn no_such_key(name: &str) -> Self {
        Self::new(S3ErrorCode::NoSuchKey, format!("no such key: {name}"), false)
    }
}

/// Transport operations the backend requires from a provider.
///
/// Implementations translate nothing: they surface provider failures as
/// [`S3Error`] and leave classification to the backend wrapper.
pub trait S3ClientApi: Send + Sync {
    fn get_object(&self, name: &str) -> Result<Bytes, S3Error>;
    fn put_object(&self, name: &str, body: Bytes) -> Result<(), S3Error>;
    fn delete_object(&self, name: &str) -> Result<(), S3Error>;
    fn head_object(&self, name: &str) -> Result<(), S3Error>;
    fn list_objects(&self, prefix: &str) -> Result<Vec<String>, S3Error>;
}
