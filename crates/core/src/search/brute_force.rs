//! Exact nearest-neighbor search by linear scan.
//!
//! The ground truth the HNSW path is measured against, and the fallback the
//! index manager uses whenever the graph is missing, unhelpful, or failing.

use crate::hnsw::distance::{cosine_distance, norm};
use crate::record::VectorRecord;
use crate::search::ScoredRecord;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Top `top_k` records by cosine similarity to `query`, most similar first.
///
/// Records whose embedding length differs from the query's are skipped.
pub fn brute_force_search<'a, I>(records: I, query: &[f32], top_k: usize) -> Vec<ScoredRecord>
where
    I: IntoIterator<Item = &'a Arc<VectorRecord>>,
{
    if top_k == 0 {
        return Vec::new();
    }
    let query_norm = norm(query);

    // Partial sort: O(n log k) via min-heap of size k
    let mut scored: Vec<&Arc<VectorRecord>> = Vec::new();
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> =
        BinaryHeap::with_capacity(top_k + 1);
    for record in records {
        if record.embedding.len() != query.len() {
            continue;
        }
        let similarity = 1.0
            - cosine_distance(
                query,
                query_norm,
                &record.embedding,
                norm(&record.embedding),
            );
        heap.push(Reverse((OrderedFloat(similarity), scored.len())));
        scored.push(record);
        if heap.len() > top_k {
            heap.pop();
        }
    }

    let mut results: Vec<ScoredRecord> = heap
        .into_iter()
        .map(|Reverse((s, i))| ScoredRecord {
            record: Arc::clone(scored[i]),
            similarity: s.0,
        })
        .collect();
    crate::search::types::rank(&mut results, top_k);
    results
}
