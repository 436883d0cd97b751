//! JSON file-backed record store.
//!
//! All records are kept in memory and mirrored to `<dir>/records.json`. Every
//! mutation rewrites the file atomically (temp file + rename) so a crash leaves
//! either the old or the new contents, never a torn file. A write that fails
//! is rolled back in memory.

use crate::config;
use crate::error::StoreError;
use crate::record::{RecordId, VectorRecord};
use crate::storage::store::RecordStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Record store persisted as a single JSON array.
///
/// Writes are synchronous: every `persist`, `delete` and `clear` rewrites the
/// whole file on the calling thread while holding the write lock, blocking the
/// executor for the duration of the write. Callers serving concurrent traffic
/// should drive it from `tokio::task::spawn_blocking` or a dedicated thread.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: RwLock<HashMap<RecordId, VectorRecord>>,
}

impl FileRecordStore {
    /// Opens (or creates) the store in `dir`, loading an existing record file.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
        }
        let path = dir.join(config::RECORDS_FILE_NAME);

        let records = if path.exists() {
            let raw = fs::read(&path)?;
            let list: Vec<VectorRecord> = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
            tracing::info!("Loaded {} records from {:?}", list.len(), path);
            list.into_iter().map(|r| (r.id, r)).collect()
        } else {
            tracing::debug!("No record file at {:?}, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Location of the JSON record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full record set: temp file, then rename over the old file.
    fn write_file(&self, records: &HashMap<RecordId, VectorRecord>) -> Result<(), StoreError> {
        let mut list: Vec<&VectorRecord> = records.values().collect();
        list.sort_by_key(|r| (r.timestamp, r.id));
        let bytes =
            serde_json::to_vec(&list).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!("Wrote {} records ({} bytes) to {:?}", list.len(), bytes.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn fetch_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn get(&self, id: &RecordId) -> Result<Option<VectorRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn persist(&self, record: &VectorRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let previous = records.insert(record.id, record.clone());
        if let Err(e) = self.write_file(&records) {
            match previous {
                Some(old) => records.insert(record.id, old),
                None => records.remove(&record.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        let Some(removed) = records.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.write_file(&records) {
            records.insert(*id, removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let previous = std::mem::take(&mut *records);
        if let Err(e) = self.write_file(&records) {
            *records = previous;
            return Err(e);
        }
        Ok(())
    }
}
