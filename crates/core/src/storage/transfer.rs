//! JSON bulk export and import.

use crate::error::{ManagerError, StoreError, TransferError};
use crate::record::NewRecord;
use crate::storage::manager::IndexManager;
use crate::storage::store::RecordStore;
use serde::Deserialize;
use std::collections::HashMap;

/// An imported entry. Everything except `text` and `embedding` is optional and
/// any stored id is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl<S: RecordStore> IndexManager<S> {
    /// All records as a pretty-printed JSON array, oldest first.
    pub async fn export_json(&self) -> Result<String, ManagerError> {
        let mut records = self.store().fetch_all().await?;
        records.sort_by_key(|r| (r.timestamp, r.id));
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        tracing::info!("Exported {} records", records.len());
        Ok(json)
    }

    /// Adds every usable entry of a JSON array as a new record.
    ///
    /// Entries lacking a non-empty `text` or `embedding` (or that do not parse
    /// as a record) are skipped. Returns the number of records added.
    pub async fn import_json(&self, json: &str) -> Result<usize, TransferError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Array(items) = value else {
            return Err(TransferError::NotAnArray);
        };

        let total = items.len();
        let mut imported = 0usize;
        for item in items {
            let entry: ImportEntry = match serde_json::from_value(item) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unparseable import entry: {}", e);
                    continue;
                }
            };
            let (Some(text), Some(embedding)) = (entry.text, entry.embedding) else {
                continue;
            };
            if text.is_empty() || embedding.is_empty() {
                continue;
            }

            self.add_record(NewRecord {
                text,
                embedding,
                model: entry.model,
                timestamp: entry.timestamp,
                metadata: entry.metadata,
            })
            .await?;
            imported += 1;
        }

        tracing::info!("Imported {} of {} entries", imported, total);
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TransferError;
    use crate::hnsw::HnswConfig;
    use crate::record::NewRecord;
    use crate::storage::manager::IndexManager;
    use crate::storage::store::MemoryRecordStore;

    fn manager() -> IndexManager<MemoryRecordStore> {
        IndexManager::new(MemoryRecordStore::new(), HnswConfig::default())
    }

    #[tokio::test]
    async fn test_import_skips_incomplete_entries() {
        let mgr = manager();
        let json = r#"[
            {"text": "ok", "embedding": [1.0, 0.0], "model": "m1"},
            {"text": "", "embedding": [1.0, 0.0]},
            {"text": "no vector"},
            {"embedding": [0.5, 0.5]},
            {"text": "empty vector", "embedding": []},
            {"text": "bad vector", "embedding": "nope"},
            42
        ]"#;
        assert_eq!(mgr.import_json(json).await.unwrap(), 1);
        let records = mgr.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model.as_deref(), Some("m1"));
        assert_eq!(records[0].dimensions, 2);
    }

    #[tokio::test]
    async fn test_import_rejects_non_array() {
        let mgr = manager();
        let err = mgr.import_json(r#"{"text": "x"}"#).await.unwrap_err();
        assert!(matches!(err, TransferError::NotAnArray));

        let err = mgr.import_json("not json").await.unwrap_err();
        assert!(matches!(err, TransferError::Json(_)));
    }

    #[tokio::test]
    async fn test_export_then_import_assigns_new_ids() {
        let source = manager();
        let mut first = NewRecord::new("alpha", vec![1.0, 0.0]);
        first.timestamp = Some(10);
        let mut second = NewRecord::new("beta", vec![0.0, 1.0]);
        second.timestamp = Some(20);
        let a = source.add_record(first).await.unwrap();
        source.add_record(second).await.unwrap();

        let exported = source.export_json().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["text"], "alpha");

        let target = manager();
        assert_eq!(target.import_json(&exported).await.unwrap(), 2);
        let imported = target.list_records().await.unwrap();
        assert!(imported.iter().all(|r| r.id != a.id));
        // Timestamps survive the trip
        assert_eq!(imported[0].timestamp, 20);
        assert_eq!(imported[1].text, "alpha");
    }
}
