//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! The graph is insert-only. Nodes are addressed internally by dense `u32`
//! slots (Struct-of-Arrays layout with one contiguous vector arena) and exposed
//! by their [`RecordId`](crate::record::RecordId). All distances are cosine.
//!
//! Insertion links a node to the `m` nearest nodes of each of its layers,
//! found by scanning the whole layer rather than by a greedy candidate search.
//! This keeps the graph quality independent of `ef_construction` at the cost of
//! insertion time linear in the layer size.

/// Vector norm and cosine distance.
pub mod distance;
/// HNSW graph structure and configuration.
pub mod graph;
/// HNSW insertion with bidirectional links and capacity pruning.
pub mod insert;
/// Comparator-driven binary heap used by graph search.
pub mod queue;
/// HNSW search: greedy upper-layer descent and base-layer best-first search.
pub mod search;
/// Epoch-stamped visited marks reused across searches.
pub mod visited;

pub use graph::{HnswConfig, HnswIndex};
pub use search::SearchHit;
