//! Scored record type for search results.

use crate::record::VectorRecord;
use std::sync::Arc;

/// A record with its cosine similarity to the query (higher = more similar).
///
/// Returned by both the HNSW path and the exact brute-force path of
/// [`IndexManager::search`](crate::storage::IndexManager::search).
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The matched record (shared with the manager's cache).
    pub record: Arc<VectorRecord>,
    /// Cosine similarity in \[-1, 1\].
    pub similarity: f32,
}

/// Sort descending by similarity and keep the first `top_k`.
pub(crate) fn rank(results: &mut Vec<ScoredRecord>, top_k: usize) {
    results.sort_unstable_by(|a, b| b.similarity.total_cmp(&a.similarity));
    results.truncate(top_k);
}
