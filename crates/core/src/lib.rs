//! # vecstash-core
//!
//! Local embedding store with HNSW approximate nearest neighbor search.
//!
//! Records (text + embedding + metadata) are kept in a pluggable
//! [`RecordStore`](storage::RecordStore). An [`IndexManager`](storage::IndexManager)
//! maintains a cosine-distance HNSW graph over them, applying inserts
//! incrementally and rebuilding lazily after updates or deletes. Searches fall
//! back to an exact scan whenever the graph cannot answer.

/// Global configuration constants: HNSW defaults, search defaults, file names.
pub mod config;
/// Error types for the index, the stores, and the manager.
pub mod error;
/// HNSW approximate nearest neighbor index: graph structure, search, insertion, and distance metrics.
pub mod hnsw;
/// Core record types: `VectorRecord`, `NewRecord`, `RecordPatch`.
pub mod record;
/// Search primitives: scored results and exact brute-force ranking.
pub mod search;
/// Storage layer: record stores, index manager, and JSON transfer.
pub mod storage;

pub use error::{IndexError, ManagerError, StoreError, TransferError};
pub use hnsw::{HnswConfig, HnswIndex, SearchHit};
pub use record::{NewRecord, RecordId, RecordPatch, VectorRecord};
pub use search::ScoredRecord;
pub use storage::{FileRecordStore, IndexManager, MemoryRecordStore, RecordStore, RecordStats};
