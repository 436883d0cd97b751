//! Error types for the index, the record stores, and the index manager.
//!
//! Input validation failures of the graph are [`IndexError`]s and never mutate
//! the index. Store failures are [`StoreError`]s and propagate through the
//! manager unchanged. Staleness is not an error: the manager resolves it by
//! rebuilding.

use crate::record::RecordId;
use thiserror::Error;

/// Errors raised by [`HnswIndex`](crate::hnsw::HnswIndex).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// The index was constructed with a dimensionality of zero.
    #[error("HNSW index requires a positive dimension, got {0}")]
    InvalidDimension(usize),

    /// A vector or query does not match the index dimensionality.
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed at construction.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// The id is already present in the index.
    #[error("node with id {0} already exists in HNSW index")]
    DuplicateId(RecordId),

    /// The graph references a node that does not exist.
    #[error("corrupt HNSW graph: {0}")]
    CorruptGraph(String),
}

/// Errors raised by a [`RecordStore`](crate::storage::RecordStore).
///
/// `Clone` so a single failed rebuild can be reported to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("record store I/O error: {0}")]
    Io(String),

    /// The persisted records could not be decoded.
    #[error("record store is corrupt: {0}")]
    Corrupt(String),

    /// Records could not be encoded for persistence.
    #[error("failed to serialize records: {0}")]
    Serialize(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Errors raised by [`IndexManager`](crate::storage::IndexManager).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No record with the given id exists in the store.
    #[error("record {0} not found")]
    NotFound(RecordId),
}

/// Errors raised by JSON bulk import.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level JSON value is not an array.
    #[error("invalid format: expected an array of records")]
    NotAnArray,

    /// Persisting an imported record failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}
