//! Storage layer: record stores, the index manager, and JSON transfer.
//!
//! Records live in a [`RecordStore`]. The [`IndexManager`] sits on top of one,
//! keeps an in-memory record cache plus HNSW graph, and serves searches.

/// JSON file-backed record store with atomic rewrites.
pub mod file_store;
/// HNSW lifecycle: incremental inserts, invalidation, single-flight rebuilds.
pub mod manager;
/// The record store trait and an in-memory implementation.
pub mod store;
/// JSON bulk export and import.
pub mod transfer;

pub use file_store::FileRecordStore;
pub use manager::{IndexManager, IndexSnapshot, RecordStats};
pub use store::{MemoryRecordStore, RecordStore};
