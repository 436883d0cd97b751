//! Core record types for vecstash.
//!
//! A [`VectorRecord`] is a stored embedding with its source text, a unique
//! UUID, and arbitrary JSON metadata. The index only looks at `id` and
//! `embedding`; everything else travels through untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque, stable identifier of a record.
pub type RecordId = Uuid;

/// A stored embedding record.
///
/// Serialized with camelCase keys so exported files stay compatible with the
/// JSON backups produced by earlier tooling (`updatedAt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    /// Unique identifier (UUID v4).
    pub id: RecordId,
    /// Source text the embedding was produced from.
    #[serde(default)]
    pub text: String,
    /// The embedding vector.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Length of `embedding` when it was last written.
    #[serde(default)]
    pub dimensions: usize,
    /// Name of the model that produced the embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation time, unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Last update time, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorRecord {
    /// Materializes a new record with a fresh UUID.
    ///
    /// `dimensions` is taken from the embedding and a missing timestamp defaults
    /// to now.
    pub fn from_new(new: NewRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            dimensions: new.embedding.len(),
            text: new.text,
            embedding: new.embedding,
            model: new.model,
            timestamp: new.timestamp.unwrap_or_else(now_millis),
            updated_at: None,
            metadata: new.metadata,
        }
    }

    /// Applies a patch as a shallow merge. The id never changes.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(embedding) = patch.embedding {
            self.dimensions = embedding.len();
            self.embedding = embedding;
        }
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata.extend(metadata);
        }
        self.updated_at = Some(now_millis());
    }

    /// Returns `true` if the record carries a non-empty embedding.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Input for creating a record; the manager assigns the id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewRecord {
    /// Creates a record input with no model and empty metadata.
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embedding,
            ..Self::default()
        }
    }
}

/// Partial update of a record. `None` fields are left untouched; metadata keys
/// are merged into the existing map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_new_sets_dimensions_and_timestamp() {
        let rec = VectorRecord::from_new(NewRecord::new("hello", vec![1.0, 2.0, 3.0]));
        assert_eq!(rec.dimensions, 3);
        assert_eq!(rec.text, "hello");
        assert!(rec.timestamp > 0);
        assert!(rec.updated_at.is_none());
    }

    #[test]
    fn test_apply_patch_merges_fields() {
        let mut new = NewRecord::new("a", vec![1.0, 0.0]);
        new.metadata.insert("source".into(), serde_json::json!("web"));
        let mut rec = VectorRecord::from_new(new);
        let id = rec.id;

        let mut meta = HashMap::new();
        meta.insert("lang".to_string(), serde_json::json!("en"));
        rec.apply(RecordPatch {
            embedding: Some(vec![0.0, 1.0, 0.0]),
            metadata: Some(meta),
            ..RecordPatch::default()
        });

        assert_eq!(rec.id, id);
        assert_eq!(rec.text, "a");
        assert_eq!(rec.dimensions, 3);
        assert!(rec.updated_at.is_some());
        assert_eq!(rec.metadata.len(), 2);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut rec = VectorRecord::from_new(NewRecord::new("x", vec![0.5]));
        rec.updated_at = Some(42);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["updatedAt"], 42);
        assert!(json.get("model").is_none());
    }

    #[test]
    fn test_deserialize_tolerates_missing_fields() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"id":"{id}","text":"only text"}}"#);
        let rec: VectorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec.id, id);
        assert!(!rec.has_embedding());
        assert!(rec.metadata.is_empty());
    }
}
