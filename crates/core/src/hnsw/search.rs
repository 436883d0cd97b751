//! HNSW search: greedy descent through the upper layers, then a bounded
//! best-first search on layer 0.

use crate::error::IndexError;
use crate::hnsw::distance::{cosine_distance, norm};
use crate::hnsw::graph::HnswIndex;
use crate::hnsw::queue::PriorityQueue;
use crate::hnsw::visited::VisitedSet;
use crate::record::RecordId;
use ordered_float::OrderedFloat;
use std::cell::RefCell;

thread_local! {
    /// Per-thread visited set, reused across searches to avoid reallocating.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::default());
}

/// A nearest-neighbor hit returned by [`HnswIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: RecordId,
    /// Cosine distance to the query, in \[0, 2\].
    pub distance: f32,
    /// `1 - distance`.
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: OrderedFloat<f32>,
    slot: u32,
}

impl HnswIndex {
    /// Approximate `top_k` nearest neighbors of `query`, nearest first.
    ///
    /// An empty index yields an empty list. `top_k == 0` also yields an empty
    /// list; it is not raised to 1. Nodes at exactly equal distance come back
    /// in heap order, which is not a stable secondary key.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => return Ok(Vec::new()),
        };
        self.check_dimension(query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(query);
        let mut current = entry_point;
        let mut current_dist = self.query_distance(query, query_norm, current)?;

        // Hill-climb each upper layer until no neighbor improves
        for layer in (1..=self.max_level).rev() {
            let mut changed = true;
            while changed {
                changed = false;
                for &neighbor in self.layer_neighbors(current, layer)? {
                    let dist = self.query_distance(query, query_norm, neighbor)?;
                    if dist < current_dist {
                        current_dist = dist;
                        current = neighbor;
                        changed = true;
                    }
                }
            }
        }

        self.search_base_layer(query, query_norm, current, current_dist, top_k)
    }

    fn search_base_layer(
        &self,
        query: &[f32],
        query_norm: f32,
        entry: u32,
        entry_dist: f32,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let ef = self.config.ef_search.max(top_k);

        SEARCH_VISITED.with(|cell| -> Result<Vec<SearchHit>, IndexError> {
            let mut visited = cell.borrow_mut();
            visited.reset(self.len());
            visited.mark(entry);

            // Nearest unexplored first
            let mut candidates =
                PriorityQueue::with_capacity(ef * 2, |a: &Candidate, b: &Candidate| {
                    a.distance.cmp(&b.distance)
                });
            // Farthest kept result at the root
            let mut results = PriorityQueue::with_capacity(ef + 1, |a: &Candidate, b: &Candidate| {
                b.distance.cmp(&a.distance)
            });

            let start = Candidate {
                distance: OrderedFloat(entry_dist),
                slot: entry,
            };
            candidates.push(start);
            results.push(start);

            while let Some(current) = candidates.pop() {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance && results.len() >= ef {
                        break;
                    }
                }

                for &neighbor in self.layer_neighbors(current.slot, 0)? {
                    if !visited.mark(neighbor) {
                        continue;
                    }
                    let dist = OrderedFloat(self.query_distance(query, query_norm, neighbor)?);
                    let candidate = Candidate {
                        distance: dist,
                        slot: neighbor,
                    };
                    candidates.push(candidate);
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }

            let mut found = results.into_vec();
            found.sort_unstable_by_key(|c| c.distance);
            found.truncate(top_k);
            Ok(found
                .into_iter()
                .map(|c| SearchHit {
                    id: self.ids[c.slot as usize],
                    distance: c.distance.0,
                    similarity: 1.0 - c.distance.0,
                })
                .collect())
        })
    }

    #[inline]
    fn query_distance(&self, query: &[f32], query_norm: f32, slot: u32) -> Result<f32, IndexError> {
        let node_norm = *self
            .norms
            .get(slot as usize)
            .ok_or_else(|| IndexError::CorruptGraph(format!("missing node for slot {slot}")))?;
        Ok(cosine_distance(query, query_norm, self.vector(slot), node_norm))
    }

    /// Neighbor slots of `slot` on `layer`; empty if the node does not reach it.
    #[inline]
    fn layer_neighbors(&self, slot: u32, layer: usize) -> Result<&[u32], IndexError> {
        let node_layers = self
            .neighbors
            .get(slot as usize)
            .ok_or_else(|| IndexError::CorruptGraph(format!("missing node for slot {slot}")))?;
        Ok(node_layers.get(layer).map_or(&[][..], |list| list.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::IndexError;
    use crate::hnsw::graph::{HnswConfig, HnswIndex};
    use uuid::Uuid;

    fn seeded(dim: usize, seed: u64) -> HnswIndex {
        HnswIndex::new(
            dim,
            HnswConfig {
                seed: Some(seed),
                ..HnswConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let idx = seeded(4, 1);
        let hits = idx.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_dimension_validated() {
        let mut idx = seeded(3, 1);
        idx.add_item(Uuid::new_v4(), &[1.0, 0.0, 0.0]).unwrap();
        let err = idx.search(&[1.0, 0.0], 1).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_zero_top_k() {
        let mut idx = seeded(2, 1);
        idx.add_item(Uuid::new_v4(), &[1.0, 0.0]).unwrap();
        assert!(idx.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_two_dimensional_scenario() {
        let mut idx = seeded(2, 42);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        idx.add_item(a, &[1.0, 0.0]).unwrap();
        idx.add_item(b, &[0.0, 1.0]).unwrap();
        idx.add_item(c, &[0.9, 0.1]).unwrap();

        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, a);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].id, c);
        assert!((hits[1].similarity - 0.99388).abs() < 1e-4);
        assert!(hits.iter().all(|h| h.id != b));
    }

    #[test]
    fn test_results_sorted_by_distance() {
        let mut idx = seeded(3, 8);
        for i in 0..40 {
            let t = i as f32 * 0.1;
            idx.add_item(Uuid::new_v4(), &[t.cos(), t.sin(), 0.5]).unwrap();
        }
        let hits = idx.search(&[1.0, 0.0, 0.5], 10).unwrap();
        assert_eq!(hits.len(), 10);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_zero_vector_node_has_unit_distance() {
        let mut idx = seeded(2, 2);
        let zero = Uuid::new_v4();
        idx.add_item(zero, &[0.0, 0.0]).unwrap();
        let hits = idx.search(&[0.3, 0.7], 1).unwrap();
        assert_eq!(hits[0].id, zero);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[0].similarity, 0.0);
    }

    #[test]
    fn test_corrupt_neighbor_reported_not_panicking() {
        let mut idx = seeded(2, 4);
        let a = Uuid::new_v4();
        idx.add_item(a, &[1.0, 0.0]).unwrap();
        idx.add_item(Uuid::new_v4(), &[0.0, 1.0]).unwrap();
        // Point a layer-0 edge of every node at a slot that does not exist
        for layers in idx.neighbors.iter_mut() {
            layers[0].push(999);
        }
        let err = idx.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, IndexError::CorruptGraph(_)));
    }
}
