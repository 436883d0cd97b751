//! Record store boundary.
//!
//! The index manager only needs to read everything, read one record, write one
//! record, delete one record, and wipe the store. Durable backends implement
//! [`RecordStore`]; [`MemoryRecordStore`] backs tests and ephemeral setups.

use crate::error::StoreError;
use crate::record::{RecordId, VectorRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistent key-value storage of [`VectorRecord`]s.
///
/// `persist` inserts or replaces by id. The manager assumes nothing beyond
/// "a completed `persist` is visible to the next `fetch_all`".
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored record, in no particular order.
    async fn fetch_all(&self) -> Result<Vec<VectorRecord>, StoreError>;

    /// A single record, or `None` if absent.
    async fn get(&self, id: &RecordId) -> Result<Option<VectorRecord>, StoreError>;

    /// Insert or replace `record`.
    async fn persist(&self, record: &VectorRecord) -> Result<(), StoreError>;

    /// Remove a record. Returns `true` if it existed.
    async fn delete(&self, id: &RecordId) -> Result<bool, StoreError>;

    /// Remove every record.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<RecordId, VectorRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn get(&self, id: &RecordId) -> Result<Option<VectorRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn persist(&self, record: &VectorRecord) -> Result<(), StoreError> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(id).is_some())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.write().clear();
        Ok(())
    }
}
