//! Scripted mock transport
//!
//! An in-process object store whose failures are scripted through the
//! symbol embedded in the object name. Building a key for
//! `failure_trigger("sym", S3Op::Get, S3ErrorCode::AccessDenied, false)`
//! makes exactly the GET of that object fail with that code; every other
//! operation on it behaves normally. Used to exercise the backend's error
//! classification without a network.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::client::{S3ClientApi, S3Error, S3ErrorCode, S3Op};

const TRIGGER_MARKER: &str = "*Failure*";

/// In-process mock object store with scripted failures
#[derive(Default)]
pub struct MockS3Client {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MockS3Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a symbol that makes `op` on it fail with `code`.
    ///
    /// The trigger rides inside the symbol so tests can script failures
    /// through the normal key-construction path.
    pub fn failure_trigger(
        symbol: &str,
        op: S3Op,
        code: S3ErrorCode,
        retryable: bool,
    ) -> String {
        format!(
            "{symbol}{TRIGGER_MARKER}{}*{}*{}",
            op_name(op),
            code.as_str(),
            if retryable { "1" } else { "0" }
        )
    }

    /// Scripted failure for `op` on `name`, if the name carries a trigger
    fn scripted_failure(name: &str, op: S3Op) -> Option<S3Error> {
        let (_, rest) = name.split_once(TRIGGER_MARKER)?;
        // The trigger lives in one path component; the version id and any
        // time range follow after a '/'
        let trigger = rest.split('/').next()?;
        let mut parts = trigger.split('*');
        let trigger_op = parts.next()?;
        let code = S3ErrorCode::parse(parts.next()?)?;
        let retryable = parts.next()? == "1";

        if trigger_op != op_name(op) {
            return None;
        }
        Some(S3Error::new(
            code,
            format!("scripted {trigger_op} failure for {name}"),
            retryable,
        ))
    }
}

fn op_name(op: S3Op) -> &'static str {
    match op {
        S3Op::Get => "GET",
        S3Op::Put => "PUT",
        S3Op::Delete => "DELETE",
        S3Op::Head => "HEAD",
        S3Op::List => "LIST",
    }
}

impl S3ClientApi for MockS3Client {
    fn get_object(&self, name: &str) -> Result<Bytes, S3Error> {
        if let Some(err) = Self::scripted_failure(name, S3Op::Get) {
            return Err(err);
        }
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| S3Error::no_such_key(name))
    }

    fn put_object(&self, name: &str, body: Bytes) -> Result<(), S3Error> {
        if let Some(err) = Self::scripted_failure(name, S3Op::Put) {
            return Err(err);
        }
        // Native semantics: an existing name is silently overwritten
        self.objects.write().insert(name.to_string(), body);
        Ok(())
    }

    fn delete_object(&self, name: &str) -> Result<(), S3Error> {
        if let Some(err) = Self::scripted_failure(name, S3Op::Delete) {
            return Err(err);
        }
        match self.objects.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(S3Error::no_such_key(name)),
        }
    }

    fn head_object(&self, name: &str) -> Result<(), S3Error> {
        if let Some(err) = Self::scripted_failure(name, S3Op::Head) {
            return Err(err);
        }
        if self.objects.read().contains_key(name) {
            Ok(())
        } else {
            Err(S3Error::no_such_key(name))
        }
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<String>, S3Error> {
        if let Some(err) = Self::scripted_failure(prefix, S3Op::List) {
            return Err(err);
        }
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
