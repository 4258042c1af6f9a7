//! Shared column buffer allocation
//!
//! When a read/decode pipeline materializes several columns concurrently,
//! each worker needs its own output buffer but book-keeping must stay
//! de-duplicated across threads. `BufferHolder` is that allocation point:
//! one mutex, an append-only registry, shared handles out.
//!
//! ## Ownership
//! The holder keeps every allocated buffer alive at least as long as the
//! holder itself; callers hold a second strong reference for writing. No
//! entry is ever released individually; tearing down the holder releases
//! whatever the callers no longer reference.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    UInt64,
    Float64,
    Utf8,
    Bool,
    /// Nanosecond timestamps
    Nanos,
}

/// Dimensionality of a column's elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Scalar,
    Array,
}

/// Shape of a requested column buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub data_type: DataType,
    pub dimension: Dimension,
}

impl TypeDescriptor {
    pub fn scalar(data_type: DataType) -> Self {
        Self {
            data_type,
            dimension: Dimension::Scalar,
        }
    }
}

/// Whether a column may omit rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sparsity {
    Permitted,
    NotPermitted,
}

/// One output column buffer, shared between the holder and a writer
#[derive(Debug)]
pub struct ColumnBuffer {
    type_descriptor: TypeDescriptor,
    sparsity: Sparsity,
    data: Mutex<Vec<u8>>,
}

impl ColumnBuffer {
    fn new(type_descriptor: TypeDescriptor, sparsity: Sparsity) -> Self {
        Self {
            type_descriptor,
            sparsity,
            data: Mutex::new(Vec::new()),
        }
    }

    pub fn type_descriptor(&self) -> TypeDescriptor {
        self.type_descriptor
    }

    pub fn sparsity(&self) -> Sparsity {
        self.sparsity
    }

    /// Reserve space for at least `additional` more bytes.
    ///
    /// Allocation failure surfaces as `ResourceExhausted` rather than
    /// aborting the process.
    pub fn reserve(&self, additional: usize) -> Result<()> {
        self.data.lock().try_reserve(additional).map_err(|e| {
            StoreError::ResourceExhausted(format!(
                "column buffer reserve of {additional} bytes failed: {e}"
            ))
        })
    }

    /// Append raw bytes to the column
    pub fn extend_from_slice(&self, bytes: &[u8]) {
        self.data.lock().extend_from_slice(bytes);
    }

    /// Current length in bytes
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Copy out the accumulated bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

/// Thread-safe registry of column buffers for one read/decode operation.
///
/// Instantiate one holder per operation, not globally; that bounds both
/// lock contention and the lifetime of the registry.
#[derive(Debug, Default)]
pub struct BufferHolder {
    columns: Mutex<Vec<Arc<ColumnBuffer>>>,
}

impl BufferHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new column buffer and register it.
    ///
    /// The returned handle stays valid independently of later allocations;
    /// the holder retains its own reference until torn down. No I/O happens
    /// inside the lock.
    pub fn get_buffer(&self, td: TypeDescriptor, sparsity: Sparsity) -> Arc<ColumnBuffer> {
        let column = Arc::new(ColumnBuffer::new(td, sparsity));
        self.columns.lock().push(Arc::clone(&column));
        column
    }

    /// Number of buffers allocated so far
    pub fn len(&self) -> usize {
        self.columns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.lock().is_empty()
    }
}
